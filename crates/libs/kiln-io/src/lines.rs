//! Reassembly of raw output chunks into lines.

/// Bytes held back while waiting for a newline before they are flushed anyway.
pub const MAX_PENDING_BYTES: usize = 8 * 1024;

/// Buffers raw output and hands back complete lines.
///
/// Every byte pushed in comes back out exactly once, in order. Lines keep
/// their `\n` terminator. A run longer than the pending limit is cut without
/// splitting a UTF-8 sequence, and whatever is left when the stream closes is
/// returned by [`LineBuffer::finish`].
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    max_pending: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_limit(MAX_PENDING_BYTES)
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer that flushes runs of `max_pending` bytes without a newline.
    pub fn with_limit(max_pending: usize) -> Self {
        Self {
            pending: Vec::new(),
            // A UTF-8 sequence is at most 4 bytes long
            max_pending: max_pending.max(4),
        }
    }

    /// Feed a chunk and collect every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            lines.push(self.take_front(pos + 1));
        }
        while self.pending.len() >= self.max_pending {
            let cut = utf8_boundary(&self.pending[..self.max_pending]);
            lines.push(self.take_front(cut));
        }
        lines
    }

    /// Flush the trailing partial line, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    fn take_front(&mut self, len: usize) -> String {
        let rest = self.pending.split_off(len);
        let line = std::mem::replace(&mut self.pending, rest);
        String::from_utf8_lossy(&line).into_owned()
    }
}

/// Where to cut `bytes` so a multibyte character at its end stays whole.
///
/// Only the last three bytes are inspected, so invalid bytes earlier in the
/// run do not move the cut.
fn utf8_boundary(bytes: &[u8]) -> usize {
    let tail_start = bytes.len().saturating_sub(3);
    let Some(lead) = (tail_start..bytes.len())
        .rev()
        .find(|&i| !is_continuation(bytes[i]))
    else {
        return bytes.len();
    };
    match std::str::from_utf8(&bytes[lead..]) {
        Err(err) if err.error_len().is_none() && lead > 0 => lead,
        _ => bytes.len(),
    }
}

fn is_continuation(byte: u8) -> bool {
    byte & 0b1100_0000 == 0b1000_0000
}
