//! Incremental UTF-8 decoding of transport chunks.
//!
//! Network chunks do not respect character boundaries. A multi-byte character
//! may arrive split over two or more chunks, so the trailing bytes of an
//! incomplete sequence are held back and prefixed to the next chunk instead
//! of being decoded (and garbled) early.

/// Stateful UTF-8 decoder that carries incomplete sequences across chunks.
///
/// # Example
/// ```
/// use chatstream::decoder::Utf8Decoder;
///
/// let mut decoder = Utf8Decoder::new();
/// // "é" is 0xC3 0xA9, split across two chunks
/// assert_eq!(decoder.decode(b"caf\xC3", false), "caf");
/// assert_eq!(decoder.decode(b"\xA9!", false), "é!");
/// ```
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    /// Undecoded tail of the previous chunk (at most 3 bytes)
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Create a new decoder with an empty carry-over buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a chunk of bytes into text.
    ///
    /// An incomplete sequence at the end of `bytes` is kept for the next call
    /// unless `is_final` is set, in which case it is decoded lossily and the
    /// buffer is cleared. Invalid sequences elsewhere become U+FFFD.
    pub fn decode(&mut self, bytes: &[u8], is_final: bool) -> String {
        let joined;
        let input: &[u8] = if self.pending.is_empty() {
            bytes
        } else {
            self.pending.extend_from_slice(bytes);
            joined = std::mem::take(&mut self.pending);
            &joined
        };

        let mut text = String::with_capacity(input.len());
        let mut rest = input;

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    if let Ok(valid) = std::str::from_utf8(valid) {
                        text.push_str(valid);
                    }

                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        // Incomplete sequence at the very end of the input
                        None => {
                            if is_final {
                                text.push_str(&String::from_utf8_lossy(after));
                            } else {
                                self.pending.extend_from_slice(after);
                            }
                            break;
                        }
                    }
                }
            }
        }

        text
    }

    /// Flush the decoder at end of stream.
    pub fn finish(&mut self) -> String {
        self.decode(&[], true)
    }

    /// Number of bytes currently held back.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
