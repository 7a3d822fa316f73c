//! Telemetry metrics for the chunk pipeline and decoder cache.
//!
//! Exported metrics:
//! - `chunks_received_total`: chunks accepted by the decoder cache.
//! - `chunks_invalid_total`: chunks rejected for a bad ESI or payload size.
//! - `chunks_duplicate_total`: chunks whose ESI was already seen.
//! - `decoders_active`: pending per-fingerprint decoders right now.
//! - `decoders_completed_total`: messages fully reconstructed.
//! - `decoder_lru_evictions_total`: fingerprints evicted from the
//!   completed-message LRU.
//! - `decode_duration_seconds`: time spent per `try_decode` call.
//! - `channel_dropped_total{channel}`: items dropped off a full bounded
//!   channel.
//! - `cpu_feature_mask` / `simd_usage_*`: dispatch-layer visibility carried
//!   over from the optimize module's SIMD policy selection.
//! - `memory_usage_bytes`: resident memory of the process.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};
use sysinfo::{ProcessesToUpdate, System};

pub static CHUNKS_RECEIVED: Lazy<IntCounter> =
    Lazy::new(|| register_int_counter!("chunks_received_total", "Total chunks accepted").unwrap());
pub static CHUNKS_INVALID: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("chunks_invalid_total", "Total chunks rejected as invalid").unwrap()
});
pub static CHUNKS_DUPLICATE: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("chunks_duplicate_total", "Total chunks with a duplicate ESI").unwrap()
});
pub static DECODERS_ACTIVE: Lazy<IntGauge> =
    Lazy::new(|| register_int_gauge!("decoders_active", "Pending per-fingerprint decoders").unwrap());
pub static DECODERS_COMPLETED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("decoders_completed_total", "Messages fully reconstructed").unwrap()
});
pub static DECODER_LRU_EVICTIONS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "decoder_lru_evictions_total",
        "Fingerprints evicted from the completed-message LRU"
    )
    .unwrap()
});
pub static DECODE_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "decode_duration_seconds",
        "Time spent per try_decode invocation"
    )
    .unwrap()
});
pub static CHANNEL_DROPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "channel_dropped_total",
        "Items dropped off a full bounded channel",
        &["channel"]
    )
    .unwrap()
});

pub static CPU_FEATURE_MASK: Lazy<IntGauge> =
    Lazy::new(|| register_int_gauge!("cpu_feature_mask", "Detected CPU features bitmask").unwrap());
pub static SIMD_USAGE_AVX512: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("simd_usage_avx512_total", "AVX512 XOR-kernel dispatches").unwrap()
});
pub static SIMD_USAGE_AVX2: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("simd_usage_avx2_total", "AVX2 XOR-kernel dispatches").unwrap()
});
pub static SIMD_USAGE_SCALAR: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("simd_usage_scalar_total", "Scalar XOR-kernel dispatches").unwrap()
});
pub static MEMORY_USAGE_BYTES: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("memory_usage_bytes", "Resident memory usage of the process").unwrap()
});

pub fn update_memory_usage() {
    let mut sys = System::new();
    let pid = sysinfo::get_current_pid().unwrap();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    if let Some(proc) = sys.process(pid) {
        MEMORY_USAGE_BYTES.set(proc.memory() as i64 * 1024);
    }
}

/// Serves the Prometheus text exposition format over a plain `TcpListener`,
/// gated behind the CLI's `--telemetry` flag.
pub fn serve(addr: &str) {
    use std::io::Write;
    use std::net::TcpListener;
    let listener = TcpListener::bind(addr).expect("bind metrics");
    std::thread::spawn(move || {
        let encoder = TextEncoder::new();
        for stream in listener.incoming().flatten() {
            let metrics = prometheus::gather();
            let mut buf = Vec::new();
            encoder.encode(&metrics, &mut buf).unwrap();
            let mut stream = stream;
            let _ = stream.write_all(&buf);
        }
    });
}

pub fn flush() {
    let encoder = TextEncoder::new();
    let metrics = prometheus::gather();
    let mut buf = Vec::new();
    if encoder.encode(&metrics, &mut buf).is_ok() {
        log::info!("\n{}", String::from_utf8_lossy(&buf));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_independently_addressable() {
        let before = CHUNKS_RECEIVED.get();
        CHUNKS_RECEIVED.inc();
        assert_eq!(CHUNKS_RECEIVED.get(), before + 1);

        let dropped_before = CHANNEL_DROPPED.with_label_values(&["tcp_ingest"]).get();
        CHANNEL_DROPPED.with_label_values(&["tcp_ingest"]).inc();
        assert_eq!(
            CHANNEL_DROPPED.with_label_values(&["tcp_ingest"]).get(),
            dropped_before + 1
        );
    }
}
