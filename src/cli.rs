use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "toaster-ctl", about = "Serial controller for the toaster reflow heater")]
pub struct Cli {
    /// Debug-level logging (RUST_LOG still takes precedence)
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// Interactive command console
    Console(ConsoleOpts),
    /// Read and print the device status once
    Status(StatusOpts),
    /// Upload a profile file, run it and log samples until it finishes
    Profile(ProfileOpts),
    /// Heat and log averaged status readings
    Monitor(MonitorOpts),
}

#[derive(Args, Debug, Clone)]
pub struct SerialOpts {
    /// Serial device path
    #[arg(long, env = "TOASTER_PORT", default_value = "/dev/ttyUSB0")]
    pub dev: String,
    /// Baud rate
    #[arg(long, default_value_t = crate::config::DEFAULT_BAUD)]
    pub baud: u32,
    /// Reply timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    pub timeout_ms: u64,
    /// Heartbeat interval in milliseconds
    #[arg(long, default_value_t = 800)]
    pub heartbeat_ms: u64,
}

#[derive(Args, Debug, Clone)]
pub struct ConsoleOpts {
    #[command(flatten)]
    pub ser: SerialOpts,
}

#[derive(Args, Debug, Clone)]
pub struct StatusOpts {
    #[command(flatten)]
    pub ser: SerialOpts,
}

#[derive(Args, Debug, Clone)]
pub struct ProfileOpts {
    #[command(flatten)]
    pub ser: SerialOpts,
    /// Profile file: one `seconds,degc` pair per line
    pub file: PathBuf,
    /// Status poll period in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub poll_ms: u64,
    /// Extra samples taken after the profile finishes
    #[arg(long, default_value_t = 30)]
    pub tail: u32,
}

#[derive(Args, Debug, Clone)]
pub struct MonitorOpts {
    #[command(flatten)]
    pub ser: SerialOpts,
    /// Status reads per second; one averaged line is printed per second
    #[arg(long, default_value_t = 10)]
    pub rate_hz: u32,
    /// Number of lines to print (0 = until interrupted)
    #[arg(long, default_value_t = 0)]
    pub windows: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_profile_args() {
        let cli = Cli::try_parse_from([
            "toaster-ctl",
            "-v",
            "profile",
            "--dev",
            "/dev/ttyACM1",
            "--poll-ms",
            "250",
            "reflow.csv",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.cmd {
            Cmd::Profile(p) => {
                assert_eq!(p.ser.dev, "/dev/ttyACM1");
                assert_eq!(p.ser.baud, 38_400);
                assert_eq!(p.poll_ms, 250);
                assert_eq!(p.tail, 30);
                assert_eq!(p.file, PathBuf::from("reflow.csv"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
