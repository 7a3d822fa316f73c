// fluxtap
//
// Passive network observer: taps a host interface, reconstructs
// application messages streamed as erasure-coded UDP chunks and
// length-prefixed TCP frames, and decodes them into structured events.

pub mod cache;
pub mod capture;
pub mod chunk;
pub mod config;
pub mod error;
pub mod fanout;
pub mod optimize;
pub mod raptorq;
pub mod tcp;
pub mod telemetry;
pub mod xdp_socket;
