//! Ashtech binary message checksums.
//!
//! Single byte checksums (MBEN) are a bytewise XOR of the payload.
//! Two byte checksums (PBEN) are the 16-bit wrapping sum of the payload
//! read as big-endian words.

/// Bytewise XOR of `payload`
pub fn xor8(payload: &[u8]) -> u8 {
    payload.iter().fold(0, |acc, b| acc ^ b)
}

/// Wrapping sum of big-endian 16-bit words. A trailing odd byte
/// is treated as the high byte of a last, zero padded, word.
pub fn word_sum16(payload: &[u8]) -> u16 {
    payload.chunks(2).fold(0u16, |acc, chunk| {
        let word = match chunk {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [hi] => u16::from_be_bytes([*hi, 0]),
            _ => 0,
        };
        acc.wrapping_add(word)
    })
}

/// Computes the checksum of `payload` for a checksum field
/// of `width` bytes, encoded the way the receiver transmits it.
pub fn compute(payload: &[u8], width: usize) -> Option<Vec<u8>> {
    match width {
        1 => Some(vec![xor8(payload)]),
        2 => Some(word_sum16(payload).to_be_bytes().to_vec()),
        _ => None,
    }
}

/// Verifies `checksum` against `payload`. The algorithm is selected
/// by the checksum width. Unsupported widths never verify.
pub fn verify(payload: &[u8], checksum: &[u8]) -> bool {
    match compute(payload, checksum.len()) {
        Some(computed) => computed == checksum,
        None => false,
    }
}
