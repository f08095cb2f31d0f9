use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use logtail::StreamOptions;

/// How idle streams are woken up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WakeMode {
    /// Re-read every poll interval.
    Poll,
    /// Re-read on filesystem events, polling as a fallback.
    Notify,
}

/// Immutable configuration used by the application runtime
#[derive(Debug, Clone)]
pub struct Config {
    pub inputs: Vec<PathBuf>,
    pub from_start: bool,
    pub regex: Option<String>,
    pub wake: WakeMode,
    pub poll_interval: Duration,
    pub channel_capacity: usize,
    pub expire_after: Option<Duration>,
    pub log_level: String,
    pub stream: StreamOptions,
}

/// User-facing CLI arguments (kept private to the CLI layer)
#[derive(Parser, Debug)]
#[command(name = "logtail", version, about = "Follow log files and named pipes across rotation and truncation")]
struct Args {
    /// Log files or named pipes to follow
    #[arg(value_name = "PATH", num_args = 1.., required = true)]
    inputs: Vec<PathBuf>,

    /// Read existing file content instead of starting at the end
    #[arg(short = 's', long = "from-start")]
    from_start: bool,

    /// Only print lines matching this regex (case-insensitive)
    #[arg(short = 'r', long = "regex")]
    regex: Option<String>,

    /// Wake-up policy for idle streams
    #[arg(long = "wake", value_enum, default_value_t = WakeMode::Poll)]
    wake: WakeMode,

    /// Idle poll interval in milliseconds
    #[arg(long = "poll-interval-ms", default_value_t = 250)]
    poll_interval_ms: u64,

    /// Pipe read timeout in milliseconds
    #[arg(long = "read-timeout-ms")]
    read_timeout_ms: Option<u64>,

    /// Read buffer size in bytes
    #[arg(long = "read-buffer-size")]
    read_buffer_size: Option<usize>,

    /// Capacity of the line channel between streams and the printer
    #[arg(long = "channel-capacity", default_value_t = 1024)]
    channel_capacity: usize,

    /// Stop streams that have read nothing for this many seconds
    #[arg(long = "expire-after-secs")]
    expire_after_secs: Option<u64>,

    /// Log filter for diagnostics on stderr (tracing env-filter syntax)
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,
}

/// Parse CLI options into an application Config
pub fn parse() -> Config {
    Args::parse().into()
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        let mut stream = StreamOptions::default();
        if let Some(ms) = args.read_timeout_ms {
            stream = stream.with_pipe_read_timeout(Duration::from_millis(ms));
        }
        if let Some(size) = args.read_buffer_size {
            stream = stream.with_read_buffer_size(size);
        }
        Config {
            inputs: args.inputs,
            from_start: args.from_start,
            regex: args.regex,
            wake: args.wake,
            poll_interval: Duration::from_millis(args.poll_interval_ms.max(1)),
            channel_capacity: args.channel_capacity.max(1),
            expire_after: args.expire_after_secs.map(Duration::from_secs),
            log_level: args.log_level,
            stream,
        }
    }
}
