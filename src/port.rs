use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::info;

use crate::config::SessionConfig;
use crate::error::{ControllerError, Result};
use crate::proto::command::TERMINATOR;

/// Byte stream the controller talks over.
pub trait Transport: Read + Write + Send {
    /// Drop whatever has been received but not yet read.
    fn discard_input(&mut self) -> std::io::Result<()>;
}

impl Transport for Box<dyn SerialPort> {
    fn discard_input(&mut self) -> std::io::Result<()> {
        self.clear(ClearBuffer::Input)?;
        Ok(())
    }
}

pub fn open_port(dev: &str, cfg: &SessionConfig) -> Result<Box<dyn Transport>> {
    let port = serialport::new(dev, cfg.baud)
        .timeout(cfg.poll_timeout)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .open()
        .map_err(|source| ControllerError::Open {
            port: dev.to_string(),
            source,
        })?;
    info!(dev, baud = cfg.baud, "serial port open");
    Ok(Box::new(port))
}

pub fn write_frame(port: &mut dyn Transport, frame: &[u8]) -> Result<()> {
    port.write_all(frame)?;
    port.flush()?;
    Ok(())
}

/// Read up to and including the terminator. Per-read timeouts are retried
/// until `timeout` has elapsed overall.
pub fn read_line(port: &mut dyn Transport, timeout: Duration) -> Result<Vec<u8>> {
    let deadline = Instant::now() + timeout;
    let mut line = Vec::with_capacity(32);
    let mut byte = [0u8; 1];
    loop {
        match port.read(&mut byte) {
            Ok(1) => {
                line.push(byte[0]);
                if byte[0] == TERMINATOR {
                    return Ok(line);
                }
                continue;
            }
            Ok(_) => {}
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
        if Instant::now() >= deadline {
            return Err(ControllerError::ReplyTimeout(timeout));
        }
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockPort;
    use super::*;

    #[test]
    fn read_line_stops_at_terminator() {
        let mut port = MockPort::new();
        port.arrive(b"1,2\nrest");
        let line = read_line(&mut port, Duration::from_millis(50)).unwrap();
        assert_eq!(line, b"1,2\n");
        assert_eq!(port.state.lock().rx.len(), 4);
    }

    #[test]
    fn read_line_times_out_without_terminator() {
        let mut port = MockPort::new();
        port.arrive(b"12");
        let started = Instant::now();
        let err = read_line(&mut port, Duration::from_millis(30)).unwrap_err();
        assert!(matches!(err, ControllerError::ReplyTimeout(_)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn write_frame_surfaces_transport_errors() {
        let mut port = MockPort::new();
        port.fail_writes();
        let err = write_frame(&mut port, b"o\n").unwrap_err();
        assert!(err.is_transport());
    }
}
