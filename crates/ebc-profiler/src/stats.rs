//! Codec statistics collection
//!
//! Provides atomic counters around encode and decode calls. The codec itself
//! keeps no counters; wrap calls with [`CodecStats`] to observe them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use ebc_codec::{Decoded, Encoded, Instruction, Op, Result};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// What the collector records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilerConfig {
    /// Keep per-family instruction counts next to the global counters
    pub per_family: bool,
}

/// Codec statistics - atomic counters for thread-safe access
pub struct CodecStats {
    /// Instructions encoded successfully
    pub instructions_encoded: AtomicU64,
    /// Instructions decoded successfully
    pub instructions_decoded: AtomicU64,
    /// Bytes appended by the encoder
    pub bytes_emitted: AtomicU64,
    /// Bytes consumed by the decoder
    pub bytes_consumed: AtomicU64,
    /// Fixups created for symbolic operands
    pub fixups_created: AtomicU64,
    /// Rejected encode calls
    pub encode_failures: AtomicU64,
    /// Rejected decode calls
    pub decode_failures: AtomicU64,
    families: Option<Mutex<FxHashMap<Op, u64>>>,
    start_time: Instant,
}

/// Instruction count of one family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FamilyCount {
    /// Opcode family
    pub op: Op,
    /// Instructions encoded or decoded
    pub count: u64,
}

/// Snapshot of codec stats (for reporting)
#[derive(Debug, Clone, Serialize)]
pub struct CodecStatsSnapshot {
    /// Duration since collection started (microseconds)
    pub duration_us: u64,
    /// Instructions encoded successfully
    pub instructions_encoded: u64,
    /// Instructions decoded successfully
    pub instructions_decoded: u64,
    /// Bytes appended by the encoder
    pub bytes_emitted: u64,
    /// Bytes consumed by the decoder
    pub bytes_consumed: u64,
    /// Fixups created for symbolic operands
    pub fixups_created: u64,
    /// Rejected encode calls
    pub encode_failures: u64,
    /// Rejected decode calls
    pub decode_failures: u64,
    /// Average encoded instruction length
    pub avg_instruction_bytes: f64,
    /// Per-family counts, ordered by opcode (empty unless enabled)
    pub families: Vec<FamilyCount>,
}

impl CodecStats {
    /// Create new stats counter
    pub fn new() -> Self {
        Self::with_config(ProfilerConfig::default())
    }

    /// Create a stats counter with the given configuration
    pub fn with_config(config: ProfilerConfig) -> Self {
        Self {
            instructions_encoded: AtomicU64::new(0),
            instructions_decoded: AtomicU64::new(0),
            bytes_emitted: AtomicU64::new(0),
            bytes_consumed: AtomicU64::new(0),
            fixups_created: AtomicU64::new(0),
            encode_failures: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            families: config
                .per_family
                .then(|| Mutex::new(FxHashMap::default())),
            start_time: Instant::now(),
        }
    }

    /// Are per-family counts kept
    pub fn per_family(&self) -> bool {
        self.families.is_some()
    }

    /// Encode `inst` into `out`, recording the outcome
    pub fn encode(&self, inst: &Instruction, out: &mut Vec<u8>) -> Result<Encoded> {
        let result = ebc_codec::encode(inst, out);
        match &result {
            Ok(encoded) => self.record_encode(inst.op(), encoded),
            Err(err) => {
                tracing::debug!("Encode of {} rejected: {}", inst.op(), err);
                self.encode_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    /// Decode one instruction from `bytes`, recording the outcome
    pub fn decode(&self, bytes: &[u8], address: u64) -> Result<Decoded> {
        let result = ebc_codec::decode(bytes, address);
        match &result {
            Ok(decoded) => self.record_decode(decoded),
            Err(_) => {
                self.decode_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    /// Record a successful encode
    #[inline]
    pub fn record_encode(&self, op: Op, encoded: &Encoded) {
        self.instructions_encoded.fetch_add(1, Ordering::Relaxed);
        self.bytes_emitted
            .fetch_add(encoded.size as u64, Ordering::Relaxed);
        self.fixups_created
            .fetch_add(encoded.fixups.len() as u64, Ordering::Relaxed);
        self.record_family(op);
    }

    /// Record a successful decode
    #[inline]
    pub fn record_decode(&self, decoded: &Decoded) {
        self.instructions_decoded.fetch_add(1, Ordering::Relaxed);
        self.bytes_consumed
            .fetch_add(decoded.size as u64, Ordering::Relaxed);
        self.record_family(decoded.instruction.op());
    }

    fn record_family(&self, op: Op) {
        if let Some(families) = &self.families {
            *families.lock().entry(op).or_insert(0) += 1;
        }
    }

    /// Take a snapshot of current stats
    pub fn snapshot(&self) -> CodecStatsSnapshot {
        let duration_us = self.start_time.elapsed().as_micros() as u64;

        let instructions_encoded = self.instructions_encoded.load(Ordering::Relaxed);
        let bytes_emitted = self.bytes_emitted.load(Ordering::Relaxed);

        let mut families: Vec<FamilyCount> = self
            .families
            .as_ref()
            .map(|families| {
                families
                    .lock()
                    .iter()
                    .map(|(&op, &count)| FamilyCount { op, count })
                    .collect()
            })
            .unwrap_or_default();
        families.sort_by_key(|family| family.op);

        CodecStatsSnapshot {
            duration_us,
            instructions_encoded,
            instructions_decoded: self.instructions_decoded.load(Ordering::Relaxed),
            bytes_emitted,
            bytes_consumed: self.bytes_consumed.load(Ordering::Relaxed),
            fixups_created: self.fixups_created.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            avg_instruction_bytes: if instructions_encoded > 0 {
                bytes_emitted as f64 / instructions_encoded as f64
            } else {
                0.0
            },
            families,
        }
    }

    /// Snapshot as JSON
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or(serde_json::Value::Null)
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.instructions_encoded.store(0, Ordering::Relaxed);
        self.instructions_decoded.store(0, Ordering::Relaxed);
        self.bytes_emitted.store(0, Ordering::Relaxed);
        self.bytes_consumed.store(0, Ordering::Relaxed);
        self.fixups_created.store(0, Ordering::Relaxed);
        self.encode_failures.store(0, Ordering::Relaxed);
        self.decode_failures.store(0, Ordering::Relaxed);
        if let Some(families) = &self.families {
            families.lock().clear();
        }
    }
}

impl Default for CodecStats {
    fn default() -> Self {
        Self::new()
    }
}
