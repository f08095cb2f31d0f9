use std::io::{self, BufWriter, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use regex::Regex;
use tokio::sync::mpsc;
use tracing::{info, warn};

use logtail::waker::{FsEventWaker, TimedWaker, Waker};
use logtail::{LogLine, StreamContext, Tailer, metrics};

use crate::cli::{Config, WakeMode};
use crate::filter::{build_filter, line_matches};

/// How often inputs are re-checked for completed or replaced streams.
const RESCAN_INTERVAL: Duration = Duration::from_secs(1);

/// Application runtime: wires streams, the supervisor, and stdout.
pub async fn run(config: Config) -> Result<()> {
    init_tracing(&config.log_level);

    let filter: Option<Regex> = build_filter(config.regex.as_deref())?;

    // Channel for log lines
    let (tx, mut rx) = mpsc::channel::<LogLine>(config.channel_capacity);

    let waker: Arc<dyn Waker> = match config.wake {
        WakeMode::Poll => Arc::new(TimedWaker::new(config.poll_interval)),
        WakeMode::Notify => Arc::new(FsEventWaker::new(&config.inputs, config.poll_interval)?),
    };
    let tailer = Tailer::new(StreamContext::new(waker, tx, config.stream), config.from_start);
    for path in &config.inputs {
        if let Err(e) = tailer.tail_path(path) {
            warn!("{e}");
        }
    }

    let prefix = config.inputs.len() > 1;
    let mut out = BufWriter::new(io::stdout().lock());
    let mut rescan = tokio::time::interval(RESCAN_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            Some(line) = rx.recv() => {
                print_line(&mut out, &line, filter.as_ref(), prefix)?;
                // Flush once the burst is drained.
                if rx.is_empty() {
                    out.flush()?;
                }
            }
            _ = rescan.tick() => rescan_inputs(&tailer, &config),
            res = &mut ctrl_c => {
                res?;
                info!("interrupted, shutting down");
                break;
            }
        }
    }

    // Streams flush partial lines on the way out; keep draining until the
    // last sender is gone.
    let shutdown = tokio::spawn(tailer.shutdown());
    while let Some(line) = rx.recv().await {
        print_line(&mut out, &line, filter.as_ref(), prefix)?;
    }
    out.flush()?;
    shutdown.await?;

    for counter in metrics::global().counters() {
        for (path, n) in counter.snapshot() {
            info!(counter = counter.name(), path = %path.display(), n, "final count");
        }
    }
    Ok(())
}

fn rescan_inputs(tailer: &Tailer, config: &Config) {
    for path in tailer.reap() {
        info!(path = %path.display(), "stream finished");
    }
    if let Some(max_age) = config.expire_after {
        tailer.expire_stale(max_age);
    }
    for path in &config.inputs {
        // A missing path may appear later; only retry what exists.
        if path.exists() && !tailer.is_tailing(path) {
            if let Err(e) = tailer.tail_path(path) {
                warn!("{e}");
            }
        }
    }
}

fn print_line(out: &mut impl Write, line: &LogLine, filter: Option<&Regex>, prefix: bool) -> io::Result<()> {
    if !line_matches(&line.text, filter) {
        return Ok(());
    }
    if prefix {
        writeln!(out, "{}: {}", line.source.display(), line.text)
    } else {
        writeln!(out, "{}", line.text)
    }
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::fmt().with_env_filter(filter).with_writer(io::stderr).init();
}
