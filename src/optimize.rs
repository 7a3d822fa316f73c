// Copyright (c) 2024, The QuicFuscate Project Authors.
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions are
// met:
//
//     * Redistributions of source code must retain the above copyright
//       notice, this list of conditions and the following disclaimer.
//
//     * Redistributions in binary form must reproduce the above
//       copyright notice, this list of conditions and the following disclaimer
//       in the documentation and/or other materials provided with the
//       distribution.
//
//     * Neither the name of the copyright holder nor the names of its
//       contributors may be used to endorse or promote products derived from
//       this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS
// "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT
// LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR
// A PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT
// OWNER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT
// LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE,
// DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY
// THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT
// (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE
// OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! # Optimization Module
//!
//! This module provides a framework for runtime CPU feature detection and
//! function dispatching to select the best hardware-accelerated implementation,
//! used by the decoder's byte mirror (`xor_bytes`) and the capture-boundary
//! socket fast path (`OptimizationManager::create_capture_socket`). `MemoryPool`
//! is kept as a standalone pooled-buffer primitive, benchmarked directly in
//! `benches/memory_pool.rs`; nothing in this crate's hot paths currently needs
//! a fixed-block-size pool, so it is not wired behind `OptimizationManager`.

use aligned_box::AlignedBox;

const MIN_ALIGN: usize = 64;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Once};
use log::info;
use std::net::SocketAddr;
use crate::xdp_socket::XdpSocket;
use crossbeam_queue::ArrayQueue;
#[cfg(target_arch = "aarch64")]
use std::arch::is_aarch64_feature_detected;
#[cfg(target_arch = "x86_64")]
use std::arch::is_x86_feature_detected;

/// Enumerates the CPU features relevant for QuicFuscate's optimizations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CpuFeature {
    // x86/x64 features
    AVX,
    AVX2,
    AVX512F,
    VAES,
    AESNI,
    PCLMULQDQ,

    // ARM features
    NEON,
}

/// Singleton for accessing detected CPU features.
/// This ensures that feature detection is performed only once.
pub struct FeatureDetector {
    features: HashMap<CpuFeature, bool>,
}

static INIT: Once = Once::new();
static mut DETECTOR: Option<FeatureDetector> = None;

impl FeatureDetector {
    /// Returns a static reference to the `FeatureDetector` singleton.
    /// The first call will initialize the detector.
    pub fn instance() -> &'static Self {
        INIT.call_once(|| {
            let mut features = HashMap::new();

            // Detect features for the current architecture at runtime.
            #[cfg(target_arch = "x86_64")]
            {
                features.insert(CpuFeature::AVX, is_x86_feature_detected!("avx"));
                features.insert(CpuFeature::AVX2, is_x86_feature_detected!("avx2"));
                features.insert(CpuFeature::AVX512F, is_x86_feature_detected!("avx512f"));
                features.insert(CpuFeature::VAES, is_x86_feature_detected!("vaes"));
                features.insert(CpuFeature::AESNI, is_x86_feature_detected!("aes"));
                features.insert(CpuFeature::PCLMULQDQ, is_x86_feature_detected!("pclmulqdq"));
            }
            #[cfg(target_arch = "aarch64")]
            {
                features.insert(CpuFeature::NEON, is_aarch64_feature_detected!("neon"));
            }

            // Unsafe block is required to initialize the static mutable variable.
            // `Once::call_once` guarantees this is safe and runs only once.
            unsafe {
                DETECTOR = Some(FeatureDetector { features });
            }
        });
        unsafe { DETECTOR.as_ref().unwrap() }
    }

    /// Checks if a specific CPU feature is supported.
    pub fn has_feature(&self, feature: CpuFeature) -> bool {
        *self.features.get(&feature).unwrap_or(&false)
    }
}

//
// SIMD Dispatching
//

/// Represents the execution policy for SIMD operations.
pub trait SimdPolicy: Any {
    fn as_any(&self) -> &dyn Any;

    /// `dst[i] ^= src[i]` over the shorter of the two slices. The default
    /// is a plain byte loop; policies with a wider natural word size
    /// override it with a chunked version.
    fn xor_into(&self, dst: &mut [u8], src: &[u8]) {
        let n = dst.len().min(src.len());
        for i in 0..n {
            dst[i] ^= src[i];
        }
    }
}

/// Marker struct for AVX-512 execution.
pub struct Avx512;
impl SimdPolicy for Avx512 {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn xor_into(&self, dst: &mut [u8], src: &[u8]) {
        xor_u64_chunked(dst, src);
    }
}

/// Marker struct for AVX2 execution.
pub struct Avx2;
impl SimdPolicy for Avx2 {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn xor_into(&self, dst: &mut [u8], src: &[u8]) {
        xor_u64_chunked(dst, src);
    }
}

/// Marker struct for PCLMULQDQ execution.
pub struct Pclmulqdq;
impl SimdPolicy for Pclmulqdq {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn xor_into(&self, dst: &mut [u8], src: &[u8]) {
        xor_u64_chunked(dst, src);
    }
}

/// Marker struct for ARM NEON execution.
pub struct Neon;
impl SimdPolicy for Neon {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn xor_into(&self, dst: &mut [u8], src: &[u8]) {
        xor_u64_chunked(dst, src);
    }
}

/// Marker struct for scalar (non-SIMD) execution.
pub struct Scalar;
impl SimdPolicy for Scalar {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Word-at-a-time XOR used by every non-scalar policy. None of them carry
/// real architecture-specific intrinsics here, but keeping the chunking
/// isolated in one helper means a future AVX2/NEON backend only has to
/// replace this function, not every policy impl.
fn xor_u64_chunked(dst: &mut [u8], src: &[u8]) {
    let n = dst.len().min(src.len());
    let chunks = n / 8;
    for c in 0..chunks {
        let off = c * 8;
        let d = u64::from_ne_bytes(dst[off..off + 8].try_into().unwrap());
        let s = u64::from_ne_bytes(src[off..off + 8].try_into().unwrap());
        dst[off..off + 8].copy_from_slice(&(d ^ s).to_ne_bytes());
    }
    for i in (chunks * 8)..n {
        dst[i] ^= src[i];
    }
}

/// Byte-XOR entry point used by the decoder's buffer mirror: `dst ^= src`
/// dispatched through whatever `SimdPolicy` the current CPU supports.
pub fn xor_bytes(dst: &mut [u8], src: &[u8]) {
    dispatch(|policy| policy.xor_into(dst, src));
}

/// Dispatches to the best available SIMD implementation at runtime.
/// The policies are ordered from most to least performant.
pub fn dispatch<F, R>(mut f: F) -> R
where
    F: FnMut(&dyn SimdPolicy) -> R,
{
    let detector = FeatureDetector::instance();

    if detector.has_feature(CpuFeature::AVX512F) {
        crate::telemetry::SIMD_USAGE_AVX512.inc();
        f(&Avx512)
    } else if detector.has_feature(CpuFeature::AVX2) {
        crate::telemetry::SIMD_USAGE_AVX2.inc();
        f(&Avx2)
    } else if detector.has_feature(CpuFeature::PCLMULQDQ) {
        f(&Pclmulqdq)
    } else if detector.has_feature(CpuFeature::NEON) {
        f(&Neon)
    } else {
        crate::telemetry::SIMD_USAGE_SCALAR.inc();
        f(&Scalar)
    }
}

//
// Foundational Structures for Global Optimizations
//

/// A high-performance, thread-safe memory pool for fixed-size blocks.
/// This implementation uses a concurrent queue to manage free blocks,
/// minimizing lock contention and fragmentation.
pub struct MemoryPool {
    pool: Arc<ArrayQueue<AlignedBox<[u8]>>>,
    block_size: usize,
}

impl MemoryPool {
    /// Creates a new memory pool with a specified capacity and block size.
    /// All allocated blocks are 64-byte aligned.
    pub fn new(capacity: usize, block_size: usize) -> Self {
        let pool = ArrayQueue::new(capacity);
        for _ in 0..capacity {
            // Pre-allocate blocks with 64-byte alignment for optimal cache performance.
            let aligned_box = AlignedBox::slice_from_value(MIN_ALIGN, block_size, 0u8).unwrap();
            if pool.push(aligned_box).is_err() {
                panic!("memory pool capacity exceeded during initialization");
            }
        }
        Self {
            pool: Arc::new(pool),
            block_size,
        }
    }

    /// Allocates a 64-byte aligned memory block from the pool.
    /// If the pool is empty, a new block is created.
    pub fn alloc(&self) -> AlignedBox<[u8]> {
        self.pool
            .pop()
            .unwrap_or_else(|| AlignedBox::slice_from_value(MIN_ALIGN, self.block_size, 0u8).unwrap())
    }

    /// Returns a memory block to the pool.
    /// If the pool is full, the block is dropped.
    pub fn free(&self, mut block: AlignedBox<[u8]>) {
        // Ensure the block is cleared before reuse to prevent data leaks.
        block.iter_mut().for_each(|x| *x = 0);
        let _ = self.pool.push(block);
    }
}

pub struct OptimizationManager {
    xdp_available: bool,
}

impl OptimizationManager {
    pub fn new() -> Self {
        let xdp_available = XdpSocket::is_supported();
        info!("XDP available: {}", xdp_available);
        Self { xdp_available }
    }

    pub fn is_xdp_available(&self) -> bool {
        self.xdp_available
    }

    pub fn create_capture_socket(&self, bind: SocketAddr) -> Option<XdpSocket> {
        if self.xdp_available {
            XdpSocket::new(bind).ok()
        } else {
            None
        }
    }
}

impl Default for OptimizationManager {
    fn default() -> Self {
        Self::new()
    }
}