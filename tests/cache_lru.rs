use fluxtap::cache::DecoderCache;
use fluxtap::chunk::{ChunkFlags, ChunkHeader};
use fluxtap::config::CacheConfig;

fn header_for(fp: [u8; 20], payload: &'static [u8]) -> ChunkHeader<'static> {
    ChunkHeader {
        signature: &[],
        version: 1,
        flags: ChunkFlags(0),
        epoch: 0,
        timestamp_ms: 0,
        fingerprint: fp,
        total_length: payload.len() as u32,
        merkle_siblings: &[],
        recipient: &[],
        leaf_index: 0,
        esi: 0,
        payload,
    }
}

#[test]
fn completed_lru_bounds_memory_and_forgets_evicted_fingerprints() {
    let cfg = CacheConfig {
        lru_capacity: 4,
        max_redundancy: 7,
    };
    let cache = DecoderCache::new(cfg);

    let mut first_fp = [0u8; 20];
    for i in 0u8..10 {
        let mut fp = [0u8; 20];
        fp[0] = i;
        if i == 0 {
            first_fp = fp;
        }
        let header = header_for(fp, b"single-k1");
        let msg = cache.handle_chunk(&header).unwrap();
        assert!(msg.is_some(), "K=1 single chunk should always complete");
    }

    assert_eq!(cache.completed_len(), 4);

    // The earliest fingerprint was evicted from the completed set, so
    // re-presenting it is treated as a brand new message, not a replay.
    let header = header_for(first_fp, b"single-k1");
    let msg = cache.handle_chunk(&header).unwrap();
    assert!(msg.is_some());
}
