//! The two ciphers used by the container format.
//!
//! Both are stateless free functions: the reduced-round Salsa20 protecting
//! the key-index size header, and the self-keyed nibble cipher protecting the
//! key-block-info section.

use byteorder::{ByteOrder, LittleEndian};
use log::trace;
use ripemd128::{Digest, Ripemd128};

use crate::error::{MdictError, Result};

/// Salt appended to the block checksum before hashing the nibble-cipher key.
const INDEX_KEY_SALT: [u8; 4] = [0x95, 0x36, 0x00, 0x00];

/// Initial value of the nibble cipher's feedback byte.
const FEEDBACK_SEED: u8 = 0x36;

/// RIPEMD-128 digest of the concatenation of `parts`.
pub fn ripemd128(parts: &[&[u8]]) -> [u8; 16] {
    let mut hasher = Ripemd128::new();
    for part in parts {
        hasher.input(part);
    }
    let mut digest = [0u8; 16];
    digest.copy_from_slice(hasher.result().as_slice());
    digest
}

/// Key for the key-block-info payload, derived from the block's checksum word.
pub fn index_key(checksum_word: &[u8]) -> [u8; 16] {
    ripemd128(&[checksum_word, &INDEX_KEY_SALT])
}

/// Decrypt a nibble-cipher payload.
///
/// Each byte is nibble-swapped, then XORed with the previous *ciphertext*
/// byte, the low byte of its index and the key byte at `index % 16`.
pub fn fast_decrypt(data: &[u8], key: &[u8; 16]) -> Vec<u8> {
    trace!("nibble-cipher decrypting {} bytes", data.len());
    let mut previous = FEEDBACK_SEED;
    data.iter()
        .enumerate()
        .map(|(i, &byte)| {
            let plain = byte.rotate_left(4) ^ previous ^ (i as u8) ^ key[i % key.len()];
            previous = byte;
            plain
        })
        .collect()
}

/// Inverse of [`fast_decrypt`].
pub fn fast_encrypt(data: &[u8], key: &[u8; 16]) -> Vec<u8> {
    let mut previous = FEEDBACK_SEED;
    data.iter()
        .enumerate()
        .map(|(i, &byte)| {
            let cipher = (byte ^ previous ^ (i as u8) ^ key[i % key.len()]).rotate_left(4);
            previous = cipher;
            cipher
        })
        .collect()
}

/// Apply the Salsa20/8 keystream (zero nonce, counter from 0) in place.
///
/// Encryption and decryption are the same operation. Keys must be 16 or 32
/// bytes long.
pub fn salsa20_8(data: &mut [u8], key: &[u8]) -> Result<()> {
    let (constants, high) = match key.len() {
        16 => ([0x61707865, 0x3120646e, 0x79622d36, 0x6b206574], &key[..16]),
        32 => ([0x61707865, 0x3320646e, 0x79622d32, 0x6b206574], &key[16..]),
        n => {
            return Err(MdictError::DecryptionFailure(format!(
                "Salsa20 key must be 16 or 32 bytes, got {}",
                n
            )))
        }
    };
    trace!("Salsa20/8 over {} bytes with a {}-byte key", data.len(), key.len());

    let mut state = [0u32; 16];
    state[0] = constants[0];
    state[5] = constants[1];
    state[10] = constants[2];
    state[15] = constants[3];
    for i in 0..4 {
        state[1 + i] = LittleEndian::read_u32(&key[i * 4..]);
        state[11 + i] = LittleEndian::read_u32(&high[i * 4..]);
    }

    let mut keystream = [0u8; 64];
    for (counter, chunk) in data.chunks_mut(64).enumerate() {
        let counter = counter as u64;
        state[8] = counter as u32;
        state[9] = (counter >> 32) as u32;

        let mut x = state;
        for _ in 0..4 {
            quarter_round(&mut x, 0, 4, 8, 12);
            quarter_round(&mut x, 5, 9, 13, 1);
            quarter_round(&mut x, 10, 14, 2, 6);
            quarter_round(&mut x, 15, 3, 7, 11);
            quarter_round(&mut x, 0, 1, 2, 3);
            quarter_round(&mut x, 5, 6, 7, 4);
            quarter_round(&mut x, 10, 11, 8, 9);
            quarter_round(&mut x, 15, 12, 13, 14);
        }
        for (i, word) in x.iter().enumerate() {
            LittleEndian::write_u32(&mut keystream[i * 4..], word.wrapping_add(state[i]));
        }
        for (byte, k) in chunk.iter_mut().zip(keystream.iter()) {
            *byte ^= k;
        }
    }
    Ok(())
}

#[inline(always)]
fn quarter_round(x: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize) {
    x[b] ^= x[a].wrapping_add(x[d]).rotate_left(7);
    x[c] ^= x[b].wrapping_add(x[a]).rotate_left(9);
    x[d] ^= x[c].wrapping_add(x[b]).rotate_left(13);
    x[a] ^= x[d].wrapping_add(x[c]).rotate_left(18);
}
