//! Command channel: the single owner of the serial link on the foreground path.
//!
//! Lifecycle is `Opened -> Active -> Closed`. Commands are refused until
//! [`CommandChannel::begin`] has started the heartbeat. Every write and the
//! reply read that follows it happen under one lock shared with the heartbeat
//! thread, so frames are never interleaved and a reply is never split by a
//! liveness token.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{ControllerError, Result};
use crate::heartbeat::{Heartbeat, SharedLink};
use crate::port::{Transport, open_port, read_line, write_frame};
use crate::proto::command::{Command, Speed};
use crate::proto::reply::{RawStatus, line_text, parse_fields, parse_status};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Link held, heartbeat paused, commands refused.
    Opened,
    /// Session begun, heartbeat running.
    Active,
    Closed,
}

/// What to read back after writing a command, while still holding the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    Nothing,
    /// A data line, decoded according to the command.
    Reply,
    /// One acknowledgement line, drained but not validated.
    Ack,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Status(RawStatus),
    Fields(Vec<f64>),
    Ack(String),
}

/// Status with temperatures converted to degrees Celsius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Status {
    pub adc_raw: i64,
    pub adc_voltage: i64,
    pub temp_degc: f64,
    pub profile_step: i32,
    pub desired_temp_degc: f64,
}

impl From<RawStatus> for Status {
    fn from(raw: RawStatus) -> Self {
        Self {
            adc_raw: raw.adc_raw,
            adc_voltage: raw.adc_voltage,
            temp_degc: raw.temp_millideg as f64 / 1000.0,
            profile_step: raw.profile_step,
            desired_temp_degc: raw.desired_millideg as f64 / 1000.0,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ADC reading: {}", self.adc_raw)?;
        writeln!(f, "ADC voltage: {}", self.adc_voltage)?;
        writeln!(f, "Calculated temperature: {:.3}", self.temp_degc)?;
        writeln!(f, "Current profile step: {}", self.profile_step)?;
        write!(f, "Desired temperature: {:.3}", self.desired_temp_degc)
    }
}

pub struct CommandChannel {
    link: SharedLink,
    heartbeat: Heartbeat,
    phase: Mutex<Phase>,
    cfg: SessionConfig,
}

impl CommandChannel {
    pub fn open(dev: &str, cfg: SessionConfig) -> Result<Self> {
        let port = open_port(dev, &cfg)?;
        Ok(Self::with_transport(port, cfg))
    }

    /// Wrap an already-open byte stream.
    pub fn with_transport(port: Box<dyn Transport>, cfg: SessionConfig) -> Self {
        let link: SharedLink = Arc::new(Mutex::new(Some(port)));
        let heartbeat = Heartbeat::new(Arc::clone(&link), cfg.heartbeat_interval);
        Self {
            link,
            heartbeat,
            phase: Mutex::new(Phase::Opened),
            cfg,
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    pub fn heartbeat(&self) -> &Heartbeat {
        &self.heartbeat
    }

    pub fn begin(&self) -> Result<()> {
        let mut phase = self.phase.lock();
        match *phase {
            Phase::Active => {
                warn!("begin called twice");
                return Err(ControllerError::AlreadyBegun);
            }
            Phase::Closed => {
                self.heartbeat.pause();
                return Err(ControllerError::NotReady);
            }
            Phase::Opened => {}
        }
        self.heartbeat.start()?;
        *phase = Phase::Active;
        info!(heartbeat = ?self.heartbeat.state().interval(), "session begun");
        Ok(())
    }

    pub fn send(&self, cmd: &Command, expect: Expect) -> Result<Option<Reply>> {
        if cmd.expects_reply() && expect != Expect::Reply {
            debug!(?cmd, "reply will be left unread");
        }
        match expect {
            Expect::Nothing => self.exchange(cmd, false, |_| Ok(None)),
            Expect::Reply => self.exchange(cmd, true, |port| {
                let line = self.read_reply(port)?;
                let reply = match cmd {
                    Command::ReadStatus => Reply::Status(parse_status(&line)?),
                    _ => Reply::Fields(parse_fields(&line)?),
                };
                Ok(Some(reply))
            }),
            Expect::Ack => self.exchange(cmd, true, |port| {
                Ok(Some(Reply::Ack(self.read_ack(port)?)))
            }),
        }
    }

    /// Write `cmd`, then run `then` on the port before the lock is released.
    /// With `fresh_input`, bytes already waiting (a reply that arrived after
    /// its read timed out) are discarded first so `then` sees this frame's answer.
    fn exchange<T>(
        &self,
        cmd: &Command,
        fresh_input: bool,
        then: impl FnOnce(&mut dyn Transport) -> Result<T>,
    ) -> Result<T> {
        if self.phase() != Phase::Active {
            warn!(?cmd, phase = ?self.phase(), "command refused, session not active");
            self.heartbeat.pause();
            return Err(ControllerError::NotReady);
        }
        let frame = cmd.encode();

        let mut guard = self.link.lock();
        let Some(port) = guard.as_mut() else {
            // Closed concurrently.
            self.heartbeat.pause();
            return Err(ControllerError::NotReady);
        };
        let port = &mut **port;
        if fresh_input {
            port.discard_input()?;
        }
        write_frame(port, &frame)?;
        debug!(?cmd, bytes = frame.len(), "sent");
        then(port)
    }

    fn read_reply(&self, port: &mut dyn Transport) -> Result<Vec<u8>> {
        read_line(port, self.cfg.reply_timeout).inspect_err(|e| {
            if matches!(e, ControllerError::ReplyTimeout(_)) {
                warn!(timeout = ?self.cfg.reply_timeout, "reply timed out");
            }
        })
    }

    fn read_ack(&self, port: &mut dyn Transport) -> Result<String> {
        let line = self.read_reply(port)?;
        let text = line_text(&line).unwrap_or_default().to_string();
        debug!(ack = %text, "ack");
        Ok(text)
    }

    fn fire(&self, cmd: Command) -> Result<()> {
        self.exchange(&cmd, false, |_| Ok(()))
    }

    pub fn stop(&self) -> Result<()> {
        self.fire(Command::Stop)
    }

    pub fn on(&self, slow: bool) -> Result<()> {
        self.fire(Command::MotorOn {
            speed: Speed::from_slow(slow),
        })
    }

    pub fn off(&self, slow: bool) -> Result<()> {
        self.fire(Command::MotorOff {
            speed: Speed::from_slow(slow),
        })
    }

    pub fn set_gain(&self, gain: f32) -> Result<()> {
        self.fire(Command::SetGain(gain))
    }

    pub fn set_temp(&self, degc: f32) -> Result<()> {
        self.fire(Command::SetTemp(degc))
    }

    /// Tell the device its sensor currently reads `degc`.
    pub fn set_calibration(&self, degc: f32) -> Result<()> {
        self.fire(Command::SetCalibration(degc))
    }

    pub fn set_hysteresis(&self, degc: f32) -> Result<()> {
        self.fire(Command::SetHysteresis(degc))
    }

    pub fn profile_clear(&self) -> Result<()> {
        self.fire(Command::ProfileClear)
    }

    /// Returns the device's acknowledgement line.
    pub fn profile_add_point(&self, time_ms: i32, temp_degc: f32) -> Result<String> {
        let cmd = Command::ProfileAddPoint { time_ms, temp_degc };
        self.exchange(&cmd, true, |port| self.read_ack(port))
    }

    /// Returns the device's acknowledgement line.
    pub fn profile_run(&self) -> Result<String> {
        self.exchange(&Command::ProfileRun, true, |port| self.read_ack(port))
    }

    pub fn read_status(&self) -> Result<Status> {
        self.exchange(&Command::ReadStatus, true, |port| {
            let line = self.read_reply(port)?;
            Ok(parse_status(&line)?.into())
        })
    }

    /// Terminate the heartbeat and release the port. Repeated calls are no-ops.
    pub fn close(&self) {
        {
            let mut phase = self.phase.lock();
            if *phase == Phase::Closed {
                return;
            }
            *phase = Phase::Closed;
        }
        self.heartbeat.terminate();
        // Waits out an in-flight heartbeat write.
        drop(self.link.lock().take());
        info!("session closed");
    }
}

impl Drop for CommandChannel {
    fn drop(&mut self) {
        self.close();
    }
}
