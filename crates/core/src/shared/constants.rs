use crate::shared::rational::Rational;

/// Frame rate used when neither a fixed rate nor a usable hint is available.
///
/// 1/25, 1001/24000 and 1001/30000 would all need 120000 fps; MPEG-4 only
/// allows 16-bit time base values, so 1001/30000 is left out.
pub const DEFAULT_FRAME_RATE: Rational = Rational::new(24000, 1);

/// Upper bound for reading a pass-1 statistics log back in.
pub const STATS_READ_LIMIT: usize = 1_000_000_000;

/// Smallest progress fraction accepted by status reporting.
pub const MIN_PROGRESS_FRACTION: f64 = 0.0001;

/// Shortest elapsed time used as a divisor in status reporting, in seconds.
pub const MIN_STATUS_ELAPSED_SECS: f64 = 0.001;

/// Maximum muxer interleaving delay, in seconds.
pub const MAX_INTERLEAVE_DELAY_SECS: f64 = 0.7;

/// Sentinel the container library understands as "write to stdout".
pub const STDOUT_PIPE: &str = "pipe:1";

/// Destinations that end up on the process' standard output.
pub const STDOUT_DESTINATIONS: &[&str] = &["/dev/stdout", "pipe:", "pipe:1"];

pub const FLAGS_KEY: &str = "flags";
pub const QSCALE_KEY: &str = "qscale";
pub const GLOBAL_QUALITY_KEY: &str = "global_quality";

/// Name of the quantizer-to-lambda constant in the codec library's
/// expression evaluator.
pub const QP2LAMBDA: &str = "QP2LAMBDA";

pub const BYTES_PER_MEGABYTE: f64 = 1_048_576.0;
