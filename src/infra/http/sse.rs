//! Incremental server-sent-events decoder for upstream task streams.
//!
//! Chunks arrive with no alignment to event boundaries, so the decoder
//! buffers partial lines across `push` calls. Only `data:` fields matter
//! here; `event:`, `id:`, `retry:` and comment lines are skipped. An event
//! is dispatched on the blank line that terminates it, with multi-line
//! data joined by `\n` per the SSE spec.

#[derive(Default)]
pub struct SseDecoder {
    buf: String,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feed a chunk of bytes; returns the data payloads of any events
    /// completed by this chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.push_str(&String::from_utf8_lossy(chunk));
        let mut out = Vec::new();
        while let Some(pos) = self.buf.find('\n') {
            let line: String = self.buf.drain(..=pos).collect();
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                if !self.data.is_empty() {
                    out.push(self.data.join("\n"));
                    self.data.clear();
                }
            } else if let Some(rest) = line.strip_prefix("data:") {
                self.data.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
            }
        }
        out
    }
}
