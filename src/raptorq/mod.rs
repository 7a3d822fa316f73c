//! RaptorQ-family systematic erasure code: parameter derivation, the
//! low-level symbol/buffer state machine, and the byte-buffer-backed
//! managed decoder built on top of it.

pub mod decoder;
pub mod heap;
pub mod managed;
pub mod matrix;
pub mod ordered_set;
pub mod params;
pub mod permutation;
pub mod ref_encoder;
pub mod state;

pub use decoder::{LowLevelDecoder, SubAssign};
pub use managed::ManagedDecoder;
pub use params::CodeParameters;
pub use ref_encoder::RefEncoder;
