/// Line terminator closing every frame on the wire.
pub const TERMINATOR: u8 = b'\n';

/// Liveness token written by the heartbeat; carries no command semantics.
pub const HEARTBEAT_TOKEN: &[u8] = b"k\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speed {
    Slow,
    Fast,
}

impl Speed {
    pub fn from_slow(slow: bool) -> Self {
        if slow { Speed::Slow } else { Speed::Fast }
    }

    fn wire(self) -> u8 {
        match self {
            Speed::Slow => 0x01,
            Speed::Fast => 0x02,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorState {
    Off,
    On,
}

impl MotorState {
    fn wire(self) -> u8 {
        match self {
            MotorState::Off => 0x01,
            MotorState::On => 0x02,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    // ---- Heater ----
    Stop,
    ReadStatus,
    MotorOn {
        speed: Speed,
    },
    MotorOff {
        speed: Speed,
    },

    // ---- Tuning ----
    SetGain(f32),
    SetTemp(f32),
    SetCalibration(f32),
    SetHysteresis(f32),

    // ---- Profile ----
    ProfileAddPoint {
        time_ms: i32,
        temp_degc: f32,
    },
    ProfileClear,
    ProfileRun,
}

impl Command {
    pub fn opcode(&self) -> &'static [u8] {
        use Command::*;
        match self {
            Stop => b"o",
            ReadStatus => b"r",
            MotorOn { .. } | MotorOff { .. } => b"m",
            SetGain(_) => b"g",
            SetTemp(_) => b"t",
            SetCalibration(_) => b"c",
            SetHysteresis(_) => b"h",
            ProfileAddPoint { .. } => b"pa",
            ProfileClear => b"pc",
            ProfileRun => b"pr",
        }
    }

    /// Whether the device answers with a data line.
    pub fn expects_reply(&self) -> bool {
        matches!(self, Command::ReadStatus)
    }

    /// Serialize to a wire frame: opcode, little-endian payload, terminator.
    pub fn encode(&self) -> Vec<u8> {
        use Command::*;
        let mut out = Vec::with_capacity(11);
        out.extend_from_slice(self.opcode());
        match *self {
            Stop | ReadStatus | ProfileClear | ProfileRun => {
                terminate(&mut out);
                return out;
            }
            MotorOn { speed } => {
                out.push(speed.wire());
                out.push(MotorState::On.wire());
            }
            MotorOff { speed } => {
                out.push(speed.wire());
                out.push(MotorState::Off.wire());
            }
            SetGain(v) | SetTemp(v) | SetCalibration(v) | SetHysteresis(v) => {
                out.extend_from_slice(&v.to_le_bytes());
            }
            ProfileAddPoint { time_ms, temp_degc } => {
                out.extend_from_slice(&time_ms.to_le_bytes());
                out.extend_from_slice(&temp_degc.to_le_bytes());
            }
        }
        // Binary payload bytes may legitimately equal the terminator.
        out.push(TERMINATOR);
        out
    }
}

/// Append the terminator to a text frame unless it already ends with one.
pub fn terminate(frame: &mut Vec<u8>) {
    if frame.last() != Some(&TERMINATOR) {
        frame.push(TERMINATOR);
    }
}
