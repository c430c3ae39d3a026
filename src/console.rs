use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Result, anyhow, bail};
use tracing::warn;

use crate::channel::CommandChannel;
use crate::profile::load_profile;
use crate::runner::{apply_defaults, upload};

/// One line typed at the console.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Stop,
    Read,
    SetTemp(f32),
    SetGain(f32),
    SetCalibration(f32),
    SetHysteresis(f32),
    Motor { slow: bool, on: bool },
    ProfileClear,
    ProfileAdd { seconds: i32, temp_degc: f32 },
    ProfileRun,
    Load(PathBuf),
    Defaults,
    /// `hb on` / `hb off`: resume or pause the keep-alive.
    Heartbeat(bool),
    Exit,
}

impl Action {
    pub fn parse(line: &str) -> Result<Self> {
        let args: Vec<&str> = line.split_whitespace().collect();
        let Some(&head) = args.first() else {
            bail!("empty input");
        };
        let float = |i: usize| -> Result<f32> {
            let raw = args
                .get(i)
                .ok_or_else(|| anyhow!("not enough values for command"))?;
            raw.parse::<f32>()
                .map_err(|_| anyhow!("not a number: {raw:?}"))
        };
        let action = match head {
            "o" => Action::Stop,
            "r" => Action::Read,
            "t" => Action::SetTemp(float(1)?),
            "g" => Action::SetGain(float(1)?),
            "c" => Action::SetCalibration(float(1)?),
            "h" => Action::SetHysteresis(float(1)?),
            "m" => {
                if args.len() < 3 {
                    bail!("not enough values for command");
                }
                let slow = match args[1] {
                    "slow" => true,
                    "fast" => false,
                    other => bail!("speed must be slow or fast, got {other:?}"),
                };
                let on = match args[2] {
                    "1" => true,
                    "0" => false,
                    other => bail!("state must be 0 or 1, got {other:?}"),
                };
                Action::Motor { slow, on }
            }
            "pc" => Action::ProfileClear,
            "pa" => {
                let seconds = args
                    .get(1)
                    .ok_or_else(|| anyhow!("not enough values for command"))?
                    .parse::<i32>()
                    .map_err(|_| anyhow!("time must be whole seconds"))?;
                Action::ProfileAdd {
                    seconds,
                    temp_degc: float(2)?,
                }
            }
            "pr" => Action::ProfileRun,
            "load" => Action::Load(
                args.get(1)
                    .map(PathBuf::from)
                    .ok_or_else(|| anyhow!("load needs a file name"))?,
            ),
            "default" => Action::Defaults,
            "hb" => match args.get(1).copied() {
                Some("on") => Action::Heartbeat(true),
                Some("off") => Action::Heartbeat(false),
                _ => bail!("usage: hb on|off"),
            },
            "x" | "exit" | "quit" => Action::Exit,
            other => bail!("input not recognized: {other:?}"),
        };
        Ok(action)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub fn execute(ch: &CommandChannel, action: Action, out: &mut impl Write) -> Result<Flow> {
    match action {
        Action::Stop => ch.stop()?,
        Action::Read => writeln!(out, "{}", ch.read_status()?)?,
        Action::SetTemp(v) => ch.set_temp(v)?,
        Action::SetGain(v) => ch.set_gain(v)?,
        Action::SetCalibration(v) => ch.set_calibration(v)?,
        Action::SetHysteresis(v) => ch.set_hysteresis(v)?,
        Action::Motor { slow, on: true } => ch.on(slow)?,
        Action::Motor { slow, on: false } => ch.off(slow)?,
        Action::ProfileClear => ch.profile_clear()?,
        Action::ProfileAdd { seconds, temp_degc } => {
            let time_ms = seconds
                .checked_mul(1000)
                .ok_or_else(|| anyhow!("time {seconds}s out of range"))?;
            let ack = ch.profile_add_point(time_ms, temp_degc)?;
            writeln!(out, "{ack}")?;
        }
        Action::ProfileRun => {
            let ack = ch.profile_run()?;
            writeln!(out, "{ack}")?;
        }
        Action::Load(path) => {
            let points = load_profile(&path)?;
            upload(ch, &points)?;
            writeln!(out, "loaded {} points from {}", points.len(), path.display())?;
        }
        Action::Defaults => apply_defaults(ch)?,
        Action::Heartbeat(true) => ch.heartbeat().resume(),
        Action::Heartbeat(false) => ch.heartbeat().pause(),
        Action::Exit => {
            ch.stop()?;
            return Ok(Flow::Exit);
        }
    }
    Ok(Flow::Continue)
}

/// Read commands until `x` or end of input. Bad input and failed commands are
/// reported and the loop continues; transport failures end it.
pub fn run(ch: &CommandChannel, input: impl BufRead, out: &mut impl Write) -> Result<()> {
    write!(out, "> ")?;
    out.flush()?;
    for line in input.lines() {
        let line = line?;
        if !line.trim().is_empty() {
            match Action::parse(&line) {
                Ok(action) => match execute(ch, action, out) {
                    Ok(Flow::Exit) => return Ok(()),
                    Ok(Flow::Continue) => {}
                    Err(e) if is_fatal(&e) => return Err(e),
                    Err(e) => {
                        warn!(error = %format!("{e:#}"), "command failed");
                        writeln!(out, "error: {e:#}")?;
                    }
                },
                Err(e) => writeln!(out, "{e}")?,
            }
        }
        write!(out, "> ")?;
        out.flush()?;
    }
    Ok(())
}

fn is_fatal(e: &anyhow::Error) -> bool {
    e.chain()
        .filter_map(|c| c.downcast_ref::<crate::error::ControllerError>())
        .any(|c| c.is_transport())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::port::mock::MockPort;
    use std::time::Duration;

    #[test]
    fn parses_console_lines() {
        assert_eq!(Action::parse("o").unwrap(), Action::Stop);
        assert_eq!(Action::parse("t 180.5").unwrap(), Action::SetTemp(180.5));
        assert_eq!(Action::parse("g -150").unwrap(), Action::SetGain(-150.0));
        assert_eq!(
            Action::parse("m slow 1").unwrap(),
            Action::Motor {
                slow: true,
                on: true,
            }
        );
        assert_eq!(
            Action::parse("m fast 0").unwrap(),
            Action::Motor {
                slow: false,
                on: false,
            }
        );
        assert_eq!(
            Action::parse("pa 90 150").unwrap(),
            Action::ProfileAdd {
                seconds: 90,
                temp_degc: 150.0,
            }
        );
        assert_eq!(
            Action::parse("load reflow.csv").unwrap(),
            Action::Load(PathBuf::from("reflow.csv"))
        );
        assert_eq!(Action::parse("hb off").unwrap(), Action::Heartbeat(false));
        assert_eq!(Action::parse("x").unwrap(), Action::Exit);
    }

    #[test]
    fn rejects_bad_console_lines() {
        assert!(Action::parse("t").is_err());
        assert!(Action::parse("t hot").is_err());
        assert!(Action::parse("m slow").is_err());
        assert!(Action::parse("m medium 1").is_err());
        assert!(Action::parse("m slow 2").is_err());
        assert!(Action::parse("pa 1.5 100").is_err());
        assert!(Action::parse("hb").is_err());
        assert!(Action::parse("hb maybe").is_err());
        assert!(Action::parse("z").is_err());
    }

    #[test]
    fn session_runs_until_exit() {
        let port = MockPort::new();
        let cfg = SessionConfig {
            reply_timeout: Duration::from_millis(50),
            heartbeat_interval: Duration::from_secs(10),
            ..SessionConfig::default()
        };
        let ch = CommandChannel::with_transport(Box::new(port.clone()), cfg);
        ch.begin().unwrap();
        port.queue_reply(b"512,2500,21300,-1,20000\n");

        let input = b"r\nbogus\nr\nm slow 1\nx\nt 100\n".as_slice();
        let mut out = Vec::new();
        run(&ch, input, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Calculated temperature: 21.300"));
        assert!(text.contains("input not recognized"));
        // Second read has no reply queued and times out without ending the loop.
        assert!(text.contains("error: no reply"));
        let written = port.written();
        assert!(written.ends_with(b"o\n"));
        assert_eq!(port.count(b"t"), 0);
    }

    #[test]
    fn heartbeat_can_be_paused_and_resumed() {
        let port = MockPort::new();
        let cfg = SessionConfig {
            heartbeat_interval: Duration::from_secs(10),
            ..SessionConfig::default()
        };
        let ch = CommandChannel::with_transport(Box::new(port), cfg);
        ch.begin().unwrap();
        let mut out = Vec::new();

        execute(&ch, Action::Heartbeat(false), &mut out).unwrap();
        assert!(!ch.heartbeat().state().is_enabled());
        execute(&ch, Action::Heartbeat(true), &mut out).unwrap();
        assert!(ch.heartbeat().state().is_enabled());
        assert!(out.is_empty());
    }
}
