//! Hashing steps around a job evaluation.

use md5::{Digest, Md5};
use sha2::Sha256;

use super::nonce::Multiplicator;
use crate::job::VM_INPUTS;

fn be_words<const N: usize>(bytes: &[u8]) -> [u32; N] {
    let mut words = [0u32; N];
    for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
        *word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    words
}

/// Derive a job's input vector.
///
/// MD5 over `multiplicator || public_key || work_id || block_id` (ids
/// big-endian) gives four words, repeated across the inputs; from the sixth
/// input on, each is also XORed with the input three places earlier.
pub fn vm_inputs(
    multiplicator: &Multiplicator,
    public_key: &[u8; 32],
    work_id: u64,
    block_id: u64,
) -> [u32; VM_INPUTS] {
    let mut hasher = Md5::new();
    hasher.update(multiplicator.to_bytes());
    hasher.update(public_key);
    hasher.update(work_id.to_be_bytes());
    hasher.update(block_id.to_be_bytes());
    let hash: [u32; 4] = be_words(&hasher.finalize());

    let mut inputs = [0u32; VM_INPUTS];
    for i in 0..VM_INPUTS {
        inputs[i] = hash[i % 4];
        if i > 4 {
            inputs[i] ^= inputs[i - 3];
        }
    }
    inputs
}

/// Proof-of-work digest of an evaluation: MD5 over the four state words
/// followed by the inputs, all big-endian.
pub fn pow_digest(state: &[u32; 4], inputs: &[u32; VM_INPUTS]) -> [u32; 4] {
    let mut hasher = Md5::new();
    for word in state.iter().chain(inputs.iter()) {
        hasher.update(word.to_be_bytes());
    }
    be_words(&hasher.finalize())
}

/// Hash announced for a bounty before it is claimed: SHA-256 over the
/// big-endian work id, the multiplicator and a trailing `0x01`.
pub fn announcement_hash(work_id: u64, multiplicator: &Multiplicator) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(work_id.to_be_bytes());
    hasher.update(multiplicator.to_bytes());
    hasher.update([1u8]);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inputs_follow_mixing_rule() {
        let m = Multiplicator::new(1, [2, 3]);
        let inputs = vm_inputs(&m, &[9; 32], 100, 200);

        for i in 0..=4 {
            assert_eq!(inputs[i], inputs[i % 4]);
        }
        for i in 5..VM_INPUTS {
            assert_eq!(inputs[i] ^ inputs[i - 3], inputs[i % 4]);
        }
    }

    #[test]
    fn test_inputs_depend_on_every_field() {
        let m = Multiplicator::new(1, [2, 3]);
        let base = vm_inputs(&m, &[9; 32], 100, 200);

        let mut other = m;
        other.advance();
        assert_ne!(vm_inputs(&other, &[9; 32], 100, 200), base);
        assert_ne!(vm_inputs(&m, &[8; 32], 100, 200), base);
        assert_ne!(vm_inputs(&m, &[9; 32], 101, 200), base);
        assert_ne!(vm_inputs(&m, &[9; 32], 100, 201), base);
    }

    #[test]
    fn test_pow_digest_matches_md5_of_message() {
        let state = [1, 2, 3, 4];
        let inputs = [0x0A0B0C0Du32; VM_INPUTS];

        let mut message = Vec::new();
        for w in state.iter().chain(inputs.iter()) {
            message.extend_from_slice(&w.to_be_bytes());
        }
        assert_eq!(message.len(), 64);

        let expected: [u32; 4] = be_words(&Md5::digest(&message));
        assert_eq!(pow_digest(&state, &inputs), expected);
    }

    #[test]
    fn test_announcement_hash_message() {
        let m = Multiplicator::new(4, [5, 6]);

        let mut message = Vec::new();
        message.extend_from_slice(&0x0102_0304_0506_0708u64.to_be_bytes());
        message.extend_from_slice(&m.to_bytes());
        message.push(1);
        assert_eq!(message.len(), 41);

        let expected: [u8; 32] = Sha256::digest(&message).into();
        assert_eq!(announcement_hash(0x0102_0304_0506_0708, &m), expected);
    }
}
