//! UDP fan-out stride slicing (§4.J): splits a captured application
//! payload into the fixed-size chunks the decoder cache expects.

use crate::error::FramingError;

/// `stride = MTU − (frame_len − payload_len − (frame_len − ipv4_total_len))`,
/// i.e. MTU minus the outer L2/L3/L4 headers riding in front of the UDP
/// application payload.
pub fn stride(mtu: u16, frame_len: u32, payload_len: u32, ipv4_total_len: u32) -> Result<u32, FramingError> {
    let outer_headers = (frame_len as i64 - payload_len as i64) - (frame_len as i64 - ipv4_total_len as i64);
    let stride = mtu as i64 - outer_headers;
    if stride <= 0 {
        return Err(FramingError::Truncation {
            offset: 0,
            needed: 1,
            available: 0,
        });
    }
    Ok(stride as u32)
}

/// Slices `payload` into chunks of exactly `stride` bytes, with a shorter
/// final chunk if `payload.len()` is not a multiple of `stride`.
pub fn slice(payload: &[u8], stride: u32) -> Vec<&[u8]> {
    debug_assert!(stride > 0);
    payload.chunks(stride as usize).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_subtracts_outer_headers() {
        // frame_len=1514 (eth payload incl ip/udp), payload_len=1472,
        // ipv4_total_len=1500 -> outer headers = (1514-1472)-(1514-1500) = 28.
        let s = stride(1500, 1514, 1472, 1500).unwrap();
        assert_eq!(s, 1472);
    }

    #[test]
    fn non_positive_stride_is_an_error() {
        assert!(stride(20, 1514, 1472, 1500).is_err());
    }

    #[test]
    fn slicing_round_trips_via_concatenation() {
        let payload: Vec<u8> = (0..=255u8).collect();
        let chunks = slice(&payload, 64);
        assert_eq!(chunks.len(), 4);
        let rejoined: Vec<u8> = chunks.into_iter().flatten().copied().collect();
        assert_eq!(rejoined, payload);
    }

    #[test]
    fn final_chunk_may_be_shorter() {
        let payload = vec![1u8; 130];
        let chunks = slice(&payload, 64);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].len(), 2);
    }
}
