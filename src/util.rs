const HEX: &[u8; 16] = b"0123456789abcdef";

/// Generate a tool-call identifier of the form `call_` followed by 24 lowercase hex chars.
#[inline]
#[must_use]
pub fn next_call_id() -> String {
    let mut out = String::with_capacity(29);
    out.push_str("call_");
    push_u64_hex_16(&mut out, fastrand::u64(..));
    push_u32_hex_8(&mut out, fastrand::u32(..));
    out
}

/// Truncate `text` to at most `max_chars` characters for log previews.
#[inline]
pub(crate) fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

fn push_u64_hex_16(out: &mut String, mut value: u64) {
    let mut buf = [b'0'; 16];
    let mut idx = 16;
    while idx > 0 {
        idx -= 1;
        let nibble = usize::try_from(value & 0x0f).unwrap_or(0);
        buf[idx] = HEX[nibble];
        value >>= 4;
    }
    for byte in buf {
        out.push(char::from(byte));
    }
}

fn push_u32_hex_8(out: &mut String, mut value: u32) {
    let mut buf = [b'0'; 8];
    let mut idx = 8;
    while idx > 0 {
        idx -= 1;
        let nibble = usize::try_from(value & 0x0f).unwrap_or(0);
        buf[idx] = HEX[nibble];
        value >>= 4;
    }
    for byte in buf {
        out.push(char::from(byte));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_id_has_prefix_and_24_hex_chars() {
        let id = next_call_id();
        let suffix = id.strip_prefix("call_").expect("call_ prefix");
        assert_eq!(suffix.len(), 24);
        assert!(suffix.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
    }

    #[test]
    fn call_ids_are_fresh() {
        let a = next_call_id();
        let b = next_call_id();
        assert_ne!(a, b);
    }

    #[test]
    fn preview_respects_char_boundaries() {
        assert_eq!(preview("héllo", 2), "hé");
        assert_eq!(preview("abc", 10), "abc");
    }
}
