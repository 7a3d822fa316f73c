//! Reference RaptorQ-family encoder.
//!
//! Solves the same L-equation pre-coding + LT system the decoder peels
//! apart, in the other direction: given all K source symbols, recover the
//! L intermediate symbols by straight Gauss-Jordan elimination, then emit
//! an encoding symbol for any ESI by XORing its LT neighbor set. This
//! exists to generate encoding symbols for tests and benchmarks -- it is
//! never used to ship data and carries none of the decoder's peeling or
//! inactivation machinery.

use super::params::CodeParameters;

pub struct RefEncoder {
    params: CodeParameters,
    symbol_size: usize,
    intermediate: Vec<Vec<u8>>,
}

impl RefEncoder {
    /// Builds the encoder from K equal-length source symbols.
    pub fn new(source_symbols: &[Vec<u8>]) -> Self {
        let k = source_symbols.len() as u32;
        let params = CodeParameters::new(k).expect("K out of range");
        let symbol_size = source_symbols[0].len();
        assert!(
            source_symbols.iter().all(|s| s.len() == symbol_size),
            "all source symbols must share one length"
        );

        let l = params.l as usize;
        let s = params.s as usize;
        let h = params.h as usize;
        let k = k as usize;

        let mut coeff = vec![vec![false; l]; l];
        let mut rhs = vec![vec![0u8; symbol_size]; l];

        params.g_ldpc(|row, col| coeff[row as usize][col as usize] ^= true);
        for r in 0..s {
            coeff[r][k + r] ^= true;
        }
        params.g_half(|h_row, col| coeff[s + h_row as usize][col as usize] ^= true);
        for r in 0..h {
            coeff[s + r][k + s + r] ^= true;
        }
        for esi in 0..k as u32 {
            let row = s + h + esi as usize;
            params.lt_sequence(esi, |sym_id| coeff[row][sym_id as usize] ^= true);
            rhs[row] = source_symbols[esi as usize].clone();
        }

        let intermediate = solve_gf2(coeff, rhs, l, symbol_size);
        RefEncoder {
            params,
            symbol_size,
            intermediate,
        }
    }

    pub fn params(&self) -> CodeParameters {
        self.params
    }

    /// Produces the encoding symbol for `esi` -- identical to the source
    /// symbol's bytes for `esi < K`, a repair symbol otherwise.
    pub fn encode(&self, esi: u32) -> Vec<u8> {
        let mut out = vec![0u8; self.symbol_size];
        self.params.lt_sequence(esi, |sym_id| {
            let src = &self.intermediate[sym_id as usize];
            for i in 0..self.symbol_size {
                out[i] ^= src[i];
            }
        });
        out
    }
}

/// Gauss-Jordan elimination over GF(2) with a byte-vector augmented column,
/// any nonzero pivot accepted (no weight-based pivot selection -- the
/// system here is always small and full rank by construction).
fn solve_gf2(mut coeff: Vec<Vec<bool>>, mut rhs: Vec<Vec<u8>>, l: usize, symbol_size: usize) -> Vec<Vec<u8>> {
    let mut pivot_row_for_col = vec![usize::MAX; l];
    let mut row = 0;
    for col in 0..l {
        let sel = (row..l).find(|&r| coeff[r][col]);
        let sel = match sel {
            Some(r) => r,
            None => continue,
        };
        coeff.swap(row, sel);
        rhs.swap(row, sel);
        for r in 0..l {
            if r != row && coeff[r][col] {
                for c in col..l {
                    coeff[r][c] ^= coeff[row][c];
                }
                for i in 0..symbol_size {
                    rhs[r][i] ^= rhs[row][i];
                }
            }
        }
        pivot_row_for_col[col] = row;
        row += 1;
    }
    assert_eq!(row, l, "reference encoder: singular pre-coding system");

    let mut intermediate = vec![vec![0u8; symbol_size]; l];
    for (col, &pivot) in pivot_row_for_col.iter().enumerate() {
        intermediate[col] = rhs[pivot].clone();
    }
    intermediate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn esi_below_k_reproduces_the_source_symbol() {
        let sources: Vec<Vec<u8>> = (0u8..4).map(|i| vec![i; 4]).collect();
        let enc = RefEncoder::new(&sources);
        for (esi, src) in sources.iter().enumerate() {
            assert_eq!(&enc.encode(esi as u32), src);
        }
    }

    #[test]
    fn repair_symbols_are_deterministic() {
        let sources: Vec<Vec<u8>> = (0u8..4).map(|i| vec![i; 4]).collect();
        let enc = RefEncoder::new(&sources);
        assert_eq!(enc.encode(7), enc.encode(7));
        assert_ne!(enc.encode(7), vec![0u8; 4]);
    }
}
