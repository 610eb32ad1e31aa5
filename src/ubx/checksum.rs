//! # UBX Checksum
//!
//! 8-bit Fletcher checksum used by the UBX protocol.
//!
//! Computed over class, id, length and payload (everything between the sync
//! bytes and the checksum itself).

/// Calculate the UBX checksum pair `(CK_A, CK_B)`
///
/// # Arguments
///
/// * `data` - Class + Id + Length + Payload
///
/// # Examples
///
/// ```
/// use gnss_logger::ubx::checksum::fletcher8;
///
/// let data = [0x06, 0x01, 0x03, 0x00, 0xF0, 0x00, 0x01];
/// assert_eq!(fletcher8(&data), (0xFB, 0x11));
/// ```
pub fn fletcher8(data: &[u8]) -> (u8, u8) {
    let mut ck_a: u8 = 0;
    let mut ck_b: u8 = 0;

    for &byte in data {
        ck_a = ck_a.wrapping_add(byte);
        ck_b = ck_b.wrapping_add(ck_a);
    }

    (ck_a, ck_b)
}

/// Check a received checksum pair against the data it covers
pub fn verify(data: &[u8], ck_a: u8, ck_b: u8) -> bool {
    fletcher8(data) == (ck_a, ck_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Wide accumulators with explicit modulo, to cross-check the wrapping version
    fn fletcher8_slow(data: &[u8]) -> (u8, u8) {
        let mut a: u32 = 0;
        let mut b: u32 = 0;

        for &byte in data {
            a = (a + byte as u32) % 256;
            b = (b + a) % 256;
        }

        (a as u8, b as u8)
    }

    #[test]
    fn test_checksum_empty() {
        assert_eq!(fletcher8(&[]), (0x00, 0x00));
    }

    #[test]
    fn test_checksum_known_vector() {
        // CFG-MSG enabling GGA on UART1
        let data = [0x06, 0x01, 0x03, 0x00, 0xF0, 0x00, 0x01];
        assert_eq!(fletcher8(&data), (0xFB, 0x11));
    }

    #[test]
    fn test_checksum_sfrbx_header() {
        let data = [0x02, 0x13, 0x02, 0x00, 0x00, 0x05];
        assert_eq!(fletcher8(&data), (0x1C, 0x78));
        assert!(verify(&data, 0x1C, 0x78));
        assert!(!verify(&data, 0x1C, 0x79));
    }

    #[test]
    fn test_checksum_matches_slow() {
        let test_data = [
            vec![0x01, 0x07, 0x5C, 0x00],
            vec![0xFF; 300],
            vec![0x02, 0x15, 0x10, 0x00],
            (0..=255u8).collect::<Vec<_>>(),
        ];

        for data in test_data.iter() {
            assert_eq!(fletcher8(data), fletcher8_slow(data), "Checksum mismatch for {:?}", data);
        }
    }

    #[test]
    fn test_checksum_detects_single_byte_change() {
        let original = [0x01, 0x07, 0x04, 0x00, 0x10, 0x20, 0x30, 0x40];
        for i in 0..original.len() {
            let mut mutated = original;
            mutated[i] ^= 0x01;
            assert_ne!(fletcher8(&original), fletcher8(&mutated), "byte {} mutation undetected", i);
        }
    }
}
