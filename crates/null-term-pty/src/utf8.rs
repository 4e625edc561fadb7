/// Turns a byte stream into text without splitting multi-byte characters
/// that straddle two reads. Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let mut out = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    // Safe: from_utf8 just validated this prefix.
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match err.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[bad..];
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        self.pending = rest.to_vec();
        out
    }

    /// Flushes an incomplete trailing sequence at end of stream.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_passes_through() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"hello\r\n"), "hello\r\n");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_split_multibyte_is_carried_over() {
        let check = "✓".as_bytes();
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(&[b'a', check[0]]), "a");
        assert_eq!(decoder.decode(&check[1..2]), "");
        assert_eq!(decoder.decode(&[check[2], b'b']), "✓b");
    }

    #[test]
    fn test_invalid_bytes_are_replaced() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(&[b'x', 0xff, b'y']), "x\u{fffd}y");
    }

    #[test]
    fn test_finish_flushes_truncated_tail() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(&[0xe2, 0x9c]), "");
        assert_eq!(decoder.finish(), "\u{fffd}");
        assert_eq!(decoder.finish(), "");
    }
}
