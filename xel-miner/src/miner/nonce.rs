//! Per-worker nonce material ("multiplicator").
//!
//! Layout, as eight little-endian words:
//!
//! | Word | Content |
//! |------|---------|
//! | 0    | worker id |
//! | 1    | zero |
//! | 2-3  | evaluation counter (low, high) |
//! | 4-5  | zero |
//! | 6-7  | random salt, drawn once per generation |
//!
//! Word 0 partitions the search space between workers, so two workers can
//! never produce the same multiplicator for one job.

use std::fmt;

pub const MULTIPLICATOR_BYTES: usize = 32;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Multiplicator([u32; 8]);

impl Multiplicator {
    /// Fresh nonce space for `worker` with the given salt.
    pub fn new(worker: u32, salt: [u32; 2]) -> Self {
        let mut words = [0u32; 8];
        words[0] = worker;
        words[6] = salt[0];
        words[7] = salt[1];
        Self(words)
    }

    /// Fresh nonce space for `worker` with a random salt.
    pub fn random(worker: u32) -> Self {
        Self::new(worker, rand::random())
    }

    /// Step to the next evaluation.
    pub fn advance(&mut self) {
        let next = self.counter().wrapping_add(1);
        self.0[2] = next as u32;
        self.0[3] = (next >> 32) as u32;
    }

    pub fn counter(&self) -> u64 {
        ((self.0[3] as u64) << 32) | self.0[2] as u64
    }

    pub fn worker(&self) -> u32 {
        self.0[0]
    }

    pub fn to_bytes(&self) -> [u8; MULTIPLICATOR_BYTES] {
        let mut bytes = [0u8; MULTIPLICATOR_BYTES];
        for (chunk, word) in bytes.chunks_exact_mut(4).zip(self.0.iter()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        bytes
    }

    /// Uppercase hex of [`to_bytes`](Self::to_bytes), as submitted.
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.to_bytes())
    }
}

impl fmt::Debug for Multiplicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Multiplicator({})", self.to_hex())
    }
}
