//! 7-bit safe value encoding
//!
//! Every byte produced here has its high bit clear so it can travel inside a
//! SysEx body untouched.

/// Largest magnitude a 3-byte value can carry (20 bits, bit 6 of the first
/// byte is the sign).
pub const MAX_MAGNITUDE: u32 = 0x0F_FFFF;

/// Sign flag inside the first byte of a 3-byte value
pub const SIGN_BIT: u8 = 0x40;

/// Largest identifier a 2-byte value can carry
pub const MAX_ID: u16 = 0x3FFF;

/// Encode a signed value into three 7-bit bytes, most significant first.
///
/// Magnitudes beyond [`MAX_MAGNITUDE`] are clamped, never rejected.
pub fn encode3(value: i32) -> [u8; 3] {
    let magnitude = value.unsigned_abs().min(MAX_MAGNITUDE);
    let sign = if value < 0 && magnitude != 0 { SIGN_BIT } else { 0 };

    [
        sign | ((magnitude >> 14) & 0x3F) as u8,
        ((magnitude >> 7) & 0x7F) as u8,
        (magnitude & 0x7F) as u8,
    ]
}

/// Decode a 3-byte value starting at `offset`.
///
/// Returns 0 when fewer than three bytes remain.
pub fn decode3(bytes: &[u8], offset: usize) -> i32 {
    let Some(b) = offset
        .checked_add(3)
        .and_then(|end| bytes.get(offset..end))
    else {
        return 0;
    };

    let magnitude =
        (((b[0] & 0x3F) as i32) << 14) | (((b[1] & 0x7F) as i32) << 7) | (b[2] & 0x7F) as i32;

    if b[0] & SIGN_BIT != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Encode an identifier (0-16383) as `[low7, high7]`
pub fn encode2(value: u16) -> [u8; 2] {
    let value = value.min(MAX_ID);
    [(value & 0x7F) as u8, ((value >> 7) & 0x7F) as u8]
}

/// Decode a 2-byte identifier starting at `offset` (0 when truncated)
pub fn decode2(bytes: &[u8], offset: usize) -> u16 {
    match offset.checked_add(2).and_then(|end| bytes.get(offset..end)) {
        Some(b) => ((b[1] & 0x7F) as u16) << 7 | (b[0] & 0x7F) as u16,
        None => 0,
    }
}

/// Encode text for the wire, dropping every character outside ASCII
pub fn encode_text(text: &str) -> Vec<u8> {
    text.chars()
        .filter(char::is_ascii)
        .map(|c| c as u8)
        .collect()
}

/// True when every byte has its high bit clear
pub fn is_seven_bit_safe(payload: &[u8]) -> bool {
    payload.iter().all(|b| *b < 0x80)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode3_zero() {
        assert_eq!(encode3(0), [0, 0, 0]);
        assert_eq!(decode3(&encode3(0), 0), 0);
    }

    #[test]
    fn test_encode3_layout() {
        // 500 = 3 * 128 + 116
        assert_eq!(encode3(500), [0x00, 0x03, 0x74]);
        assert_eq!(encode3(-500), [0x40, 0x03, 0x74]);
    }

    #[test]
    fn test_encode3_clamps_overflow() {
        assert_eq!(decode3(&encode3(i32::MAX), 0), MAX_MAGNITUDE as i32);
        assert_eq!(decode3(&encode3(i32::MIN), 0), -(MAX_MAGNITUDE as i32));
        assert_eq!(decode3(&encode3(0x1F_FFFF), 0), MAX_MAGNITUDE as i32);
    }

    #[test]
    fn test_decode3_truncated_is_zero() {
        assert_eq!(decode3(&[0x01, 0x02], 0), 0);
        assert_eq!(decode3(&[0x01, 0x02, 0x03], 1), 0);
        assert_eq!(decode3(&[0x01, 0x02, 0x03], usize::MAX), 0);
    }

    #[test]
    fn test_decode3_at_offset() {
        let mut bytes = vec![0x7F];
        bytes.extend_from_slice(&encode3(-1234));
        assert_eq!(decode3(&bytes, 1), -1234);
    }

    #[test]
    fn test_encode2_bounds() {
        assert_eq!(encode2(0), [0, 0]);
        assert_eq!(encode2(MAX_ID), [0x7F, 0x7F]);
        assert_eq!(encode2(u16::MAX), [0x7F, 0x7F]);
        assert_eq!(decode2(&[0x05], 0), 0);
    }

    #[test]
    fn test_encode_text_drops_non_ascii() {
        assert_eq!(encode_text("Bass"), b"Bass".to_vec());
        assert_eq!(encode_text("Café ♪ Lead"), b"Caf  Lead".to_vec());
        assert!(is_seven_bit_safe(&encode_text("Ünïcödé")));
    }

    proptest! {
        #[test]
        fn prop_encode3_round_trip(v in -(MAX_MAGNITUDE as i32)..=(MAX_MAGNITUDE as i32)) {
            let bytes = encode3(v);
            prop_assert!(is_seven_bit_safe(&bytes));
            prop_assert_eq!(decode3(&bytes, 0), v);
        }

        #[test]
        fn prop_encode3_clamps_with_sign(v in any::<i32>()) {
            prop_assume!(v.unsigned_abs() > MAX_MAGNITUDE);
            let expected = if v < 0 { -(MAX_MAGNITUDE as i32) } else { MAX_MAGNITUDE as i32 };
            prop_assert_eq!(decode3(&encode3(v), 0), expected);
        }

        #[test]
        fn prop_encode2_round_trip(v in 0u16..=MAX_ID) {
            let bytes = encode2(v);
            prop_assert!(is_seven_bit_safe(&bytes));
            prop_assert_eq!(decode2(&bytes, 0), v);
        }
    }
}
