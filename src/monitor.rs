use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::info;

use crate::channel::{CommandChannel, Status};
use crate::cli::MonitorOpts;

/// Running sums of status reads over one reporting window.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    pub samples: u32,
    adc_raw: f64,
    adc_voltage: f64,
    temp_degc: f64,
    desired_degc: f64,
    t0: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Averages {
    pub adc_raw: f64,
    pub adc_voltage: f64,
    pub temp_degc: f64,
    pub desired_degc: f64,
    pub over: Duration,
}

impl Default for SampleWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleWindow {
    pub fn new() -> Self {
        Self {
            samples: 0,
            adc_raw: 0.0,
            adc_voltage: 0.0,
            temp_degc: 0.0,
            desired_degc: 0.0,
            t0: Instant::now(),
        }
    }

    pub fn add(&mut self, s: &Status) {
        self.samples += 1;
        self.adc_raw += s.adc_raw as f64;
        self.adc_voltage += s.adc_voltage as f64;
        self.temp_degc += s.temp_degc;
        self.desired_degc += s.desired_temp_degc;
    }

    /// Averages so far, then start a fresh window. `None` if empty.
    pub fn take(&mut self) -> Option<Averages> {
        if self.samples == 0 {
            return None;
        }
        let n = self.samples as f64;
        let avg = Averages {
            adc_raw: self.adc_raw / n,
            adc_voltage: self.adc_voltage / n,
            temp_degc: self.temp_degc / n,
            desired_degc: self.desired_degc / n,
            over: self.t0.elapsed(),
        };
        *self = Self::new();
        Some(avg)
    }
}

/// Sample until `opts.windows` lines are printed, a read fails, or
/// `interrupted` is set. The heater is stopped in every case.
pub fn run(ch: &CommandChannel, opts: &MonitorOpts, interrupted: &AtomicBool) -> Result<()> {
    let rate_hz = opts.rate_hz.max(1);
    let period = Duration::from_secs(1) / rate_hz;

    ch.on(true).context("motor on (slow)")?;
    ch.on(false).context("motor on (fast)")?;

    println!("adc_raw, adc_voltage, temp_degc, desired_degc");
    let result = sample_loop(ch, rate_hz, period, opts.windows, interrupted);
    let stopped = ch.stop().context("stopping heater");
    result.and(stopped)
}

fn sample_loop(
    ch: &CommandChannel,
    rate_hz: u32,
    period: Duration,
    windows: u64,
    interrupted: &AtomicBool,
) -> Result<()> {
    let mut window = SampleWindow::new();
    let mut done: u64 = 0;
    while windows == 0 || done < windows {
        for _ in 0..rate_hz {
            if interrupted.load(Ordering::Relaxed) {
                info!(windows = done, "interrupted");
                return Ok(());
            }
            let status = ch.read_status().context("reading status")?;
            window.add(&status);
            std::thread::sleep(period);
        }
        if let Some(avg) = window.take() {
            println!(
                "{:.1}, {:.1}, {:.3}, {:.3}",
                avg.adc_raw, avg.adc_voltage, avg.temp_degc, avg.desired_degc
            );
            done += 1;
            if done % 10 == 0 {
                info!(windows = done, last_temp = avg.temp_degc, "10 more windows logged");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::SerialOpts;
    use crate::config::SessionConfig;
    use crate::port::mock::MockPort;
    use crate::proto::command::tests::{decode_frame, frame_len};
    use crate::proto::command::{Command, HEARTBEAT_TOKEN, Speed};

    fn opts(windows: u64) -> MonitorOpts {
        MonitorOpts {
            ser: SerialOpts {
                dev: "mock".into(),
                baud: 38_400,
                timeout_ms: 50,
                heartbeat_ms: 10_000,
            },
            rate_hz: 50,
            windows,
        }
    }

    fn session() -> (CommandChannel, MockPort) {
        let port = MockPort::new();
        let cfg = SessionConfig {
            reply_timeout: Duration::from_millis(50),
            heartbeat_interval: Duration::from_secs(10),
            ..SessionConfig::default()
        };
        let ch = CommandChannel::with_transport(Box::new(port.clone()), cfg);
        ch.begin().unwrap();
        (ch, port)
    }

    fn sent(port: &MockPort) -> Vec<Command> {
        let w = port.written();
        let mut rest = w.as_slice();
        let mut out = Vec::new();
        while !rest.is_empty() {
            let (f, tail) = rest.split_at(frame_len(rest).unwrap());
            if f != HEARTBEAT_TOKEN {
                out.push(decode_frame(f).unwrap());
            }
            rest = tail;
        }
        out
    }

    #[test]
    fn interrupt_stops_heater() {
        let (ch, port) = session();
        let interrupted = AtomicBool::new(true);
        run(&ch, &opts(0), &interrupted).unwrap();
        assert_eq!(
            sent(&port),
            vec![
                Command::MotorOn { speed: Speed::Slow },
                Command::MotorOn { speed: Speed::Fast },
                Command::Stop,
            ]
        );
    }

    #[test]
    fn read_failure_still_stops_heater() {
        let (ch, port) = session();
        let interrupted = AtomicBool::new(false);
        let err = run(&ch, &opts(0), &interrupted).unwrap_err();
        assert!(format!("{err:#}").contains("reading status"));
        assert_eq!(sent(&port).last(), Some(&Command::Stop));
    }

    #[test]
    fn bounded_run_prints_requested_windows() {
        let (ch, port) = session();
        for _ in 0..50 {
            port.queue_reply(b"100,200,21000,-1,0\n");
        }
        run(&ch, &opts(1), &AtomicBool::new(false)).unwrap();
        let reads = sent(&port)
            .iter()
            .filter(|c| **c == Command::ReadStatus)
            .count();
        assert_eq!(reads, 50);
        assert_eq!(sent(&port).last(), Some(&Command::Stop));
    }

    fn status(raw: i64, temp: f64) -> Status {
        Status {
            adc_raw: raw,
            adc_voltage: raw * 2,
            temp_degc: temp,
            profile_step: -1,
            desired_temp_degc: 0.0,
        }
    }

    #[test]
    fn averages_and_resets() {
        let mut w = SampleWindow::new();
        assert!(w.take().is_none());
        w.add(&status(100, 20.0));
        w.add(&status(300, 22.0));
        let avg = w.take().unwrap();
        assert_eq!(avg.adc_raw, 200.0);
        assert_eq!(avg.adc_voltage, 400.0);
        assert!((avg.temp_degc - 21.0).abs() < 1e-9);
        assert_eq!(w.samples, 0);
        assert!(w.take().is_none());
    }
}
