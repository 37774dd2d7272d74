//! CRC-16 used as the token block integrity check.
//!
//! Reflected polynomial 0xA001 (0x8005), register preset 0xFFFF, no final
//! XOR, bits consumed LSB-first. These are the MODBUS parameters of the
//! CRC-16/ARC family.

/// Reflected generator polynomial.
pub const CRC16_POLY: u16 = 0xA001;

/// Register preset.
pub const CRC16_INIT: u16 = 0xFFFF;

/// Compute the checksum of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = CRC16_INIT;

    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ CRC16_POLY;
            } else {
                crc >>= 1;
            }
        }
    }

    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert_eq!(crc16(b"123456789"), 0x4B37);
    }

    #[test]
    fn test_empty_input_is_preset() {
        assert_eq!(crc16(&[]), CRC16_INIT);
    }

    #[test]
    fn test_single_bit_flips_change_crc() {
        let data = [0x03u8, 0x41, 0x23, 0x45, 0x67, 0x89, 0xAB];
        let base = crc16(&data);
        for byte in 0..data.len() {
            for bit in 0..8 {
                let mut flipped = data;
                flipped[byte] ^= 1 << bit;
                assert_ne!(crc16(&flipped), base, "byte {} bit {}", byte, bit);
            }
        }
    }
}
