//! Line framing over decoded stream text.

/// Accumulates text and yields complete `\n`-terminated lines.
///
/// The trailing fragment after the last newline is retained until more text
/// arrives or the stream ends.
///
/// # Example
/// ```
/// use chatstream::framer::LineFramer;
///
/// let mut framer = LineFramer::new();
/// assert!(framer.feed("data: {\"content\":\"hel").is_empty());
/// assert_eq!(framer.feed("lo\"}\nda"), vec!["data: {\"content\":\"hello\"}"]);
/// assert_eq!(framer.flush().as_deref(), Some("da"));
/// ```
#[derive(Debug, Default)]
pub struct LineFramer {
    /// Incomplete last line; never contains `\n`
    buffer: String,
}

impl LineFramer {
    /// Create a new framer with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed text and return every line it completes, in arrival order.
    ///
    /// Returned lines do not include the `\n`. Empty lines are returned as
    /// empty strings.
    pub fn feed(&mut self, text: &str) -> Vec<String> {
        let Some(last_newline) = text.rfind('\n') else {
            self.buffer.push_str(text);
            return Vec::new();
        };

        let (complete, rest) = text.split_at(last_newline);
        self.buffer.push_str(complete);

        let lines = self.buffer.split('\n').map(str::to_string).collect();
        self.buffer.clear();
        // skip the newline itself
        self.buffer.push_str(&rest[1..]);

        lines
    }

    /// Take the residual partial line at end of stream, if non-empty.
    pub fn flush(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }

    /// The partial line currently buffered.
    pub fn remaining(&self) -> &str {
        &self.buffer
    }
}
