use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::channel::{CommandChannel, Status};
use crate::cli::ProfileOpts;
use crate::config::{DEFAULT_CALIBRATION_DEGC, DEFAULT_GAIN, DEFAULT_HYSTERESIS_DEGC};
use crate::profile::{ProfilePoint, load_profile};

/// Device settle time between setup commands.
const SETUP_GAP: Duration = Duration::from_millis(100);

/// Begin the session, then gain, calibration, an empty profile and hysteresis.
pub fn init_device(ch: &CommandChannel) -> Result<()> {
    ch.begin().context("begin session")?;
    std::thread::sleep(SETUP_GAP);
    ch.set_gain(DEFAULT_GAIN).context("set gain")?;
    std::thread::sleep(SETUP_GAP);
    ch.set_calibration(DEFAULT_CALIBRATION_DEGC)
        .context("set calibration")?;
    std::thread::sleep(SETUP_GAP);
    ch.profile_clear().context("clear profile")?;
    std::thread::sleep(SETUP_GAP);
    ch.set_hysteresis(DEFAULT_HYSTERESIS_DEGC)
        .context("set hysteresis")?;
    std::thread::sleep(SETUP_GAP);
    Ok(())
}

pub fn apply_defaults(ch: &CommandChannel) -> Result<()> {
    ch.set_gain(DEFAULT_GAIN).context("set gain")?;
    std::thread::sleep(SETUP_GAP);
    ch.set_calibration(DEFAULT_CALIBRATION_DEGC)
        .context("set calibration")?;
    std::thread::sleep(SETUP_GAP);
    ch.set_hysteresis(DEFAULT_HYSTERESIS_DEGC)
        .context("set hysteresis")?;
    std::thread::sleep(SETUP_GAP);
    Ok(())
}

/// Clear the device profile and add every point in order.
pub fn upload(ch: &CommandChannel, points: &[ProfilePoint]) -> Result<()> {
    ch.profile_clear().context("clear profile")?;
    for (i, p) in points.iter().enumerate() {
        let ack = ch
            .profile_add_point(p.time_ms()?, p.temp_degc as f32)
            .with_context(|| format!("adding profile point {i}"))?;
        debug!(point = i, ack = %ack, "profile point added");
    }
    info!(points = points.len(), "profile uploaded");
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub elapsed: Duration,
    pub status: Status,
}

impl Sample {
    pub fn line(&self) -> String {
        format!(
            "{:.3}, {:.3}, {:.3}, {}",
            self.elapsed.as_secs_f64(),
            self.status.temp_degc,
            self.status.desired_temp_degc,
            self.status.profile_step
        )
    }
}

/// Start the uploaded profile and sample until the device reports it finished
/// (negative step), then take `tail` more samples. Each sample goes to `emit`.
/// If `interrupted` is set the heater is stopped and the run ends early.
pub fn run_uploaded(
    ch: &CommandChannel,
    poll: Duration,
    tail: u32,
    interrupted: &AtomicBool,
    mut emit: impl FnMut(&Sample),
) -> Result<()> {
    let ack = ch.profile_run().context("starting profile")?;
    debug!(ack = %ack, "profile started");
    let start = Instant::now();
    std::thread::sleep(SETUP_GAP);

    loop {
        if interrupted.load(Ordering::Relaxed) {
            return abort(ch, start);
        }
        let sample = take_sample(ch, start)?;
        emit(&sample);
        if sample.status.profile_step < 0 {
            break;
        }
        std::thread::sleep(poll);
    }
    info!(elapsed = ?start.elapsed(), "profile done");

    for _ in 0..tail {
        std::thread::sleep(poll);
        if interrupted.load(Ordering::Relaxed) {
            return abort(ch, start);
        }
        emit(&take_sample(ch, start)?);
    }
    Ok(())
}

fn abort(ch: &CommandChannel, start: Instant) -> Result<()> {
    info!(elapsed = ?start.elapsed(), "interrupted, stopping heater");
    ch.stop().context("stopping heater")
}

fn take_sample(ch: &CommandChannel, start: Instant) -> Result<Sample> {
    let status = ch.read_status().context("reading status")?;
    Ok(Sample {
        elapsed: start.elapsed(),
        status,
    })
}

pub fn run(ch: &CommandChannel, opts: &ProfileOpts, interrupted: &AtomicBool) -> Result<()> {
    let points = load_profile(&opts.file)?;
    init_device(ch)?;
    upload(ch, &points)?;
    println!("elapsed_s, temp_degc, desired_degc, profile_step");
    run_uploaded(
        ch,
        Duration::from_millis(opts.poll_ms),
        opts.tail,
        interrupted,
        |s| println!("{}", s.line()),
    )
}
