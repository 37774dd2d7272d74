//! Single-block DES wrapper (ECB, no padding).
//!
//! Tokens are exactly one 64-bit block, so there is no chaining and no IV.
//! Widths are enforced by the types: blocks and keys are `u64`.

use des::cipher::generic_array::GenericArray;
use des::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use des::Des;

fn cipher_for(key: u64) -> Des {
    Des::new(GenericArray::from_slice(&key.to_be_bytes()))
}

fn to_u64(block: &[u8]) -> u64 {
    let mut out = [0u8; 8];
    out.copy_from_slice(block);
    u64::from_be_bytes(out)
}

/// Encrypt one 64-bit block.
pub fn encrypt_block(plaintext: u64, key: u64) -> u64 {
    let mut block = GenericArray::clone_from_slice(&plaintext.to_be_bytes());
    cipher_for(key).encrypt_block(&mut block);
    to_u64(&block)
}

/// Decrypt one 64-bit block.
pub fn decrypt_block(ciphertext: u64, key: u64) -> u64 {
    let mut block = GenericArray::clone_from_slice(&ciphertext.to_be_bytes());
    cipher_for(key).decrypt_block(&mut block);
    to_u64(&block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fips_known_answer() {
        let key = 0x1334_5779_9BBC_DFF1;
        let ct = encrypt_block(0x0123_4567_89AB_CDEF, key);
        assert_eq!(ct, 0x85E8_1354_0F0A_B405);
        assert_eq!(decrypt_block(ct, key), 0x0123_4567_89AB_CDEF);
    }

    #[test]
    fn test_deterministic_without_iv() {
        let key = 0x9BBE_3EBF_C1D0_ABC5;
        let pt = 0x3426_C26E_339A_4DDE;
        assert_eq!(encrypt_block(pt, key), encrypt_block(pt, key));
    }

    proptest! {
        #[test]
        fn prop_decrypt_inverts_encrypt(pt in any::<u64>(), key in any::<u64>()) {
            prop_assert_eq!(decrypt_block(encrypt_block(pt, key), key), pt);
        }
    }
}
