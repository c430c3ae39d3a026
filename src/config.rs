use std::time::Duration;

use crate::cli::SerialOpts;

pub const DEFAULT_BAUD: u32 = 38_400;
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(800);
/// Per-read timeout on the port; the reply deadline is enforced on top of it.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

// Device tuning applied by `default` and the profile runner.
pub const DEFAULT_GAIN: f32 = -150.0;
pub const DEFAULT_CALIBRATION_DEGC: f32 = 20.0;
pub const DEFAULT_HYSTERESIS_DEGC: f32 = 3.0;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub baud: u32,
    pub reply_timeout: Duration,
    pub poll_timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            baud: DEFAULT_BAUD,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

impl SessionConfig {
    pub fn from_opts(opts: &SerialOpts) -> Self {
        Self {
            baud: opts.baud,
            reply_timeout: Duration::from_millis(opts.timeout_ms),
            heartbeat_interval: Duration::from_millis(opts.heartbeat_ms),
            ..Self::default()
        }
    }
}
