//! Line-buffered chunk recovery shared by the Ollama (NDJSON) and OpenAI
//! (SSE `data: ` lines) adapters.
//!
//! Both wire formats deliver one complete JSON value per logical line, but
//! transport chunks rarely align with line boundaries — a single `Bytes`
//! chunk off the wire can hold half a line, several whole lines, or a line
//! plus the start of the next one. `LineBuffer` accumulates raw bytes and
//! greedily yields every complete line it can, leaving any trailing partial
//! line buffered for the next `push` (spec.md §8, P3: consumption is
//! monotonic — buffered bytes are a suffix of what's been pushed, never
//! reordered or duplicated).

pub struct LineBuffer {
    buf: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self { buf: String::new() }
    }

    /// Feed newly received bytes and drain every complete (`\n`-terminated)
    /// line now available, in order. Invalid UTF-8 is replaced lossily
    /// rather than dropping the chunk, since a single bad byte shouldn't
    /// stall the whole stream.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.push_str(&String::from_utf8_lossy(bytes));
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.find('\n') {
            let line = self.buf[..pos].trim_end_matches('\r').to_string();
            self.buf.drain(..=pos);
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// Whatever remains buffered after the stream ends; a well-formed stream
    /// leaves this empty or whitespace-only.
    pub fn remainder(&self) -> &str {
        &self.buf
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip an SSE `data: ` prefix, as OpenAI's chat-completions stream uses.
/// Returns `None` for lines that aren't a `data:` line (e.g. blank
/// keep-alives or `event:` lines OpenAI doesn't send but a proxy might).
pub fn strip_sse_data_prefix(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(|rest| rest.trim_start())
}
