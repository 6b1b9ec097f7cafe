use bytes::{Buf, BytesMut};

/// Splits a response body into messages.
///
/// Understands Server-Sent Events framing (`data:` lines, dispatched on a blank line) as well as
/// plain newline-delimited JSON, where every line starting with `{` is a complete message.
/// Chunks may end anywhere, including inside a multi-byte character.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: BytesMut,
    data: Vec<String>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one chunk of the body, returning every message it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut messages = Vec::new();
        while let Some(newline) = self.pending.iter().position(|b| *b == b'\n') {
            let line = self.pending.split_to(newline);
            self.pending.advance(1);

            if let Some(message) = self.line(&line) {
                messages.push(message);
            }
        }

        messages
    }

    /// The body ended: flush a trailing unterminated line and any undispatched `data:` payload.
    pub fn finish(&mut self) -> Vec<String> {
        let mut messages = Vec::new();

        if !self.pending.is_empty() {
            let line = self.pending.split();
            if let Some(message) = self.line(&line) {
                messages.push(message);
            }
        }
        if let Some(message) = self.dispatch() {
            messages.push(message);
        }

        messages
    }

    fn line(&mut self, raw: &[u8]) -> Option<String> {
        let line = String::from_utf8_lossy(raw);
        let line = line.strip_suffix('\r').unwrap_or(&line);

        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        if line.starts_with('{') {
            return Some(line.to_string());
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        // event, id and retry carry nothing the pipeline needs.
        if field == "data" {
            self.data.push(value.to_string());
        }

        None
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }

        let message = self.data.join("\n");
        self.data.clear();
        Some(message)
    }
}
