use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use super::{LogStream, StreamContext};
use crate::config::StreamOptions;
use crate::logline::LogLine;
use crate::waker::ManualWaker;

const TIMEOUT: Duration = Duration::from_secs(5);
const KICK_EVERY: Duration = Duration::from_millis(10);

/// A stream context wired to a manual waker and a small line channel.
pub(crate) struct Harness {
    pub cx: StreamContext,
    pub waker: Arc<ManualWaker>,
    pub rx: mpsc::Receiver<LogLine>,
}

impl Harness {
    pub fn new() -> Self {
        let waker = Arc::new(ManualWaker::new());
        let (tx, rx) = mpsc::channel(16);
        let options = StreamOptions::default().with_pipe_read_timeout(Duration::from_millis(10));
        let cx = StreamContext::new(waker.clone(), tx, options);
        Self { cx, waker, rx }
    }

    /// Receive the next line's text, kicking idle streams while waiting.
    pub async fn next_line(&mut self) -> anyhow::Result<String> {
        let deadline = Instant::now() + TIMEOUT;
        loop {
            tokio::select! {
                line = self.rx.recv() => {
                    return line.map(|l| l.text).ok_or_else(|| anyhow::anyhow!("line channel closed"));
                }
                _ = tokio::time::sleep(KICK_EVERY) => {
                    if Instant::now() > deadline {
                        anyhow::bail!("timed out waiting for a line");
                    }
                    self.waker.kick();
                }
            }
        }
    }

    /// Kick for a while and check nothing arrives.
    pub async fn expect_no_line(&mut self) -> anyhow::Result<()> {
        for _ in 0..10 {
            self.waker.kick();
            tokio::time::sleep(KICK_EVERY).await;
        }
        if let Ok(line) = self.rx.try_recv() {
            anyhow::bail!("unexpected line {:?}", line.text);
        }
        Ok(())
    }

    /// Wait, without kicking, until `n` streams are parked on the waker.
    pub async fn wait_parked(&self, n: usize) -> anyhow::Result<()> {
        let deadline = Instant::now() + TIMEOUT;
        while self.waker.waiting() < n {
            if Instant::now() > deadline {
                anyhow::bail!("only {} of {n} streams parked", self.waker.waiting());
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        Ok(())
    }

    /// Wait until `stream` reports completion.
    pub async fn wait_complete(&self, stream: &dyn LogStream) -> anyhow::Result<()> {
        let deadline = Instant::now() + TIMEOUT;
        while !stream.is_complete() {
            if Instant::now() > deadline {
                anyhow::bail!("stream for {} never completed", stream.pathname().display());
            }
            self.waker.kick();
            tokio::time::sleep(KICK_EVERY).await;
        }
        Ok(())
    }
}
