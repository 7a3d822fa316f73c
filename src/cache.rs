//! Decoder cache (§4.H): dispatches chunks to per-fingerprint managed
//! decoders, evicts completed fingerprints through a bounded LRU, and
//! keeps the create-or-lookup path race-free under concurrent fan-in.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use log::warn;

use crate::chunk::{ChunkHeader, FINGERPRINT_LEN};
use crate::config::CacheConfig;
use crate::error::DecodeError;
use crate::raptorq::{CodeParameters, ManagedDecoder};

pub type Fingerprint = [u8; FINGERPRINT_LEN];

/// A fully reconstructed application message, ready for downstream
/// emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub fingerprint: Fingerprint,
    pub data: Vec<u8>,
}

/// Fixed-capacity, insertion-ordered set used to remember which
/// fingerprints have already been fully decoded. Plain `VecDeque` + `HashMap`
/// rather than a crate dependency: membership and FIFO eviction are all
/// this cache needs, and a true recency-promoting LRU would add
/// bookkeeping entries never access again after a message completes.
struct CompletedLru {
    capacity: usize,
    order: VecDeque<Fingerprint>,
    members: HashMap<Fingerprint, ()>,
}

impl CompletedLru {
    fn new(capacity: usize) -> Self {
        CompletedLru {
            capacity,
            order: VecDeque::new(),
            members: HashMap::new(),
        }
    }

    fn contains(&self, fp: &Fingerprint) -> bool {
        self.members.contains_key(fp)
    }

    fn insert(&mut self, fp: Fingerprint) {
        if self.members.insert(fp, ()).is_some() {
            return;
        }
        self.order.push_back(fp);
        if self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
                crate::telemetry::DECODER_LRU_EVICTIONS.inc();
            }
        }
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

struct Inner {
    pending: HashMap<Fingerprint, ManagedDecoder>,
    completed: CompletedLru,
}

/// Process-wide table of in-flight and recently completed decodes, keyed
/// by message fingerprint. A read-mostly lock lets lookups for distinct
/// fingerprints proceed concurrently; creating or removing an entry
/// promotes to the exclusive lock.
pub struct DecoderCache {
    config: CacheConfig,
    inner: RwLock<Inner>,
}

impl DecoderCache {
    pub fn new(config: CacheConfig) -> Self {
        DecoderCache {
            inner: RwLock::new(Inner {
                pending: HashMap::new(),
                completed: CompletedLru::new(config.lru_capacity),
            }),
            config,
        }
    }

    pub fn completed_len(&self) -> usize {
        self.inner.read().unwrap().completed.len()
    }

    pub fn pending_len(&self) -> usize {
        self.inner.read().unwrap().pending.len()
    }

    /// Single entry point for a parsed chunk: routes it to the right
    /// decoder (creating one on the first chunk for a fingerprint),
    /// attempts decode, and returns the reconstructed message once
    /// `source_paired` reaches `K`.
    ///
    /// Returns `Ok(None)` both for "need more chunks" and for the silent
    /// duplicate/already-completed cases — only malformed input or a
    /// fatal per-fingerprint failure is `Err`.
    pub fn handle_chunk(&self, header: &ChunkHeader<'_>) -> Result<Option<DecodedMessage>, DecodeError> {
        crate::telemetry::CHUNKS_RECEIVED.inc();
        let fp = header.fingerprint;

        if self.inner.read().unwrap().completed.contains(&fp) {
            return Ok(None);
        }

        {
            let guard = self.inner.read().unwrap();
            if !guard.pending.contains_key(&fp) {
                drop(guard);
                self.create_decoder(fp, header)?;
                crate::telemetry::DECODERS_ACTIVE.set(self.pending_len() as i64);
            }
        }

        let mut guard = self.inner.write().unwrap();
        let decoder = match guard.pending.get_mut(&fp) {
            Some(d) => d,
            None => return Ok(None), // raced with a concurrent completion/removal
        };

        match decoder.receive_symbol(header.esi as u32, header.payload) {
            Ok(()) => {}
            Err(DecodeError::DuplicateSymbol(_)) => {
                crate::telemetry::CHUNKS_DUPLICATE.inc();
                return Ok(None);
            }
            Err(e) => {
                crate::telemetry::CHUNKS_INVALID.inc();
                guard.pending.remove(&fp);
                return Err(e);
            }
        }

        let done = {
            let _timer = crate::telemetry::DECODE_DURATION.start_timer();
            decoder.try_decode()
        };
        if !done {
            return Ok(None);
        }

        let data = decoder.reconstruct()?;
        guard.pending.remove(&fp);
        guard.completed.insert(fp);
        crate::telemetry::DECODERS_ACTIVE.set(guard.pending.len() as i64);
        crate::telemetry::DECODERS_COMPLETED.inc();

        if crate::chunk::compute_fingerprint(&data) != fp {
            warn!("reassembled message does not hash back to its own fingerprint");
        }

        Ok(Some(DecodedMessage { fingerprint: fp, data }))
    }

    fn create_decoder(&self, fp: Fingerprint, header: &ChunkHeader<'_>) -> Result<(), DecodeError> {
        let t = header.payload.len();
        if t == 0 {
            return Err(DecodeError::InvalidSymbol {
                esi: header.esi as u32,
                size: 0,
                expected: 1,
            });
        }
        let total_size = header.total_length as usize;
        let k = total_size.div_ceil(t).max(1);
        let k = k.min(crate::raptorq::params::SOURCE_SYMBOLS_MAX as usize);

        let max_redundancy = self.config.max_redundancy.max(1);
        let params = CodeParameters::new(k as u32)?;

        let mut guard = self.inner.write().unwrap();
        guard
            .pending
            .entry(fp)
            .or_insert_with(|| ManagedDecoder::new(params, t, total_size, max_redundancy));
        Ok(())
    }
}

/// Logs a rate-limited warning for a dropped item on a full bounded
/// channel; `ChannelFull` is never a typed error per the error taxonomy.
pub fn warn_channel_full(channel: &str) {
    warn!("channel '{channel}' full, dropping newest item");
    crate::telemetry::CHANNEL_DROPPED.with_label_values(&[channel]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_for<'a>(fp: Fingerprint, esi: u16, total_length: u32, payload: &'a [u8]) -> ChunkHeader<'a> {
        ChunkHeader {
            signature: &[],
            version: 1,
            flags: crate::chunk::ChunkFlags(0),
            epoch: 0,
            timestamp_ms: 0,
            fingerprint: fp,
            total_length,
            merkle_siblings: &[],
            recipient: &[],
            leaf_index: 0,
            esi,
            payload,
        }
    }

    #[test]
    fn single_chunk_k_one_completes_immediately() {
        let cache = DecoderCache::new(CacheConfig::default());
        let fp = [1u8; FINGERPRINT_LEN];
        let payload = b"01234567";
        let header = header_for(fp, 0, payload.len() as u32, payload);
        let result = cache.handle_chunk(&header).unwrap();
        let msg = result.expect("K=1 single chunk should complete immediately");
        assert_eq!(msg.data, payload);
        assert_eq!(cache.completed_len(), 1);
        assert_eq!(cache.pending_len(), 0);
    }

    #[test]
    fn completed_fingerprint_is_silently_dropped_on_replay() {
        let cache = DecoderCache::new(CacheConfig::default());
        let fp = [2u8; FINGERPRINT_LEN];
        let payload = b"abcdefgh";
        let header = header_for(fp, 0, payload.len() as u32, payload);
        assert!(cache.handle_chunk(&header).unwrap().is_some());
        assert!(cache.handle_chunk(&header).unwrap().is_none());
    }

    #[test]
    fn duplicate_esi_before_completion_is_silent() {
        let mut cfg = CacheConfig::default();
        cfg.lru_capacity = 10;
        let cache = DecoderCache::new(cfg);
        let fp = [3u8; FINGERPRINT_LEN];
        // total_length forces K=4 with T=4, so one symbol never completes it.
        let header = header_for(fp, 0, 16, b"abcd");
        assert!(cache.handle_chunk(&header).unwrap().is_none());
        assert!(cache.handle_chunk(&header).unwrap().is_none());
        assert_eq!(cache.pending_len(), 1);
    }
}
