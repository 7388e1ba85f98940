//! Ascii85 decoding for job sources.
//!
//! Accepts the Adobe variant: optional `<~` / `~>` delimiters, `z` as a
//! shorthand for four zero bytes, whitespace ignored anywhere. A trailing
//! partial group of `n` characters yields `n - 1` bytes.

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid character {0:?} at offset {1}")]
    InvalidChar(char, usize),

    #[error("'z' inside a group at offset {0}")]
    MisplacedZ(usize),

    #[error("group overflows 32 bits at offset {0}")]
    Overflow(usize),

    #[error("dangling single character in final group")]
    Truncated,
}

const BASE: u64 = 85;

/// Decode `input` into raw bytes.
pub fn decode(input: &str) -> Result<Vec<u8>, DecodeError> {
    let body = input.trim();
    let body = body.strip_prefix("<~").unwrap_or(body);
    let body = body.strip_suffix("~>").unwrap_or(body);

    let mut out = Vec::with_capacity(body.len() / 5 * 4 + 4);
    let mut group = [0u8; 5];
    let mut filled = 0;

    for (offset, c) in body.char_indices() {
        if c.is_ascii_whitespace() {
            continue;
        }

        if c == 'z' {
            if filled != 0 {
                return Err(DecodeError::MisplacedZ(offset));
            }
            out.extend_from_slice(&[0; 4]);
            continue;
        }

        if !('!'..='u').contains(&c) {
            return Err(DecodeError::InvalidChar(c, offset));
        }

        group[filled] = c as u8 - b'!';
        filled += 1;

        if filled == 5 {
            let value = group_value(&group).ok_or(DecodeError::Overflow(offset))?;
            out.extend_from_slice(&value.to_be_bytes());
            filled = 0;
        }
    }

    match filled {
        0 => {}
        1 => return Err(DecodeError::Truncated),
        n => {
            // Pad with the highest digit so truncation rounds correctly
            for digit in group.iter_mut().skip(n) {
                *digit = 84;
            }
            let value = group_value(&group).ok_or(DecodeError::Overflow(body.len()))?;
            out.extend_from_slice(&value.to_be_bytes()[..n - 1]);
        }
    }

    Ok(out)
}

fn group_value(group: &[u8; 5]) -> Option<u32> {
    let value = group
        .iter()
        .fold(0u64, |acc, digit| acc * BASE + *digit as u64);
    u32::try_from(value).ok()
}
