use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc::Sender;

use crate::logline::LogLine;

/// Bytes read from a source that have not been terminated by `\n` yet.
///
/// Text is decoded only when a line is emitted, so a multi-byte character
/// split across two reads is reassembled before decoding.
#[derive(Debug, Default)]
pub(crate) struct PartialLine {
    buf: Vec<u8>,
}

/// The consumer dropped its end of the line channel.
#[derive(Debug)]
pub(crate) struct SinkClosed;

impl PartialLine {
    pub(crate) fn len(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Split `chunk` on line terminators.
    ///
    /// Returns every completed line (terminator excluded), the first one
    /// prefixed by whatever was carried over. Trailing bytes stay buffered.
    pub(crate) fn decode(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.buf.extend_from_slice(&rest[..pos]);
            lines.push(self.take());
            rest = &rest[pos + 1..];
        }
        self.buf.extend_from_slice(rest);
        lines
    }

    /// Drain the buffer as a line even though it has no terminator.
    pub(crate) fn flush(&mut self) -> Option<String> {
        if self.is_empty() { None } else { Some(self.take()) }
    }

    /// Drop the buffered bytes without emitting them.
    pub(crate) fn discard(&mut self) -> usize {
        let n = self.buf.len();
        self.buf.clear();
        n
    }

    fn take(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        line
    }
}

/// Decode `chunk` and send every completed line, waiting while the sink is full.
pub(crate) async fn decode_and_send(
    lines: &Sender<LogLine>,
    source: &Arc<Path>,
    chunk: &[u8],
    partial: &mut PartialLine,
) -> Result<(), SinkClosed> {
    for text in partial.decode(chunk) {
        send_line(lines, source, text).await?;
    }
    Ok(())
}

/// Force out the partial buffer, if there is anything in it.
pub(crate) async fn flush_partial(
    lines: &Sender<LogLine>,
    source: &Arc<Path>,
    partial: &mut PartialLine,
) -> Result<(), SinkClosed> {
    match partial.flush() {
        Some(text) => send_line(lines, source, text).await,
        None => Ok(()),
    }
}

async fn send_line(lines: &Sender<LogLine>, source: &Arc<Path>, text: String) -> Result<(), SinkClosed> {
    lines
        .send(LogLine::new(Arc::clone(source), text))
        .await
        .map_err(|_| SinkClosed)
}

#[cfg(test)]
#[path = "decode_tests.rs"]
mod tests;
