use thiserror::Error;

/// Number of comma-separated fields in a status line.
pub const STATUS_FIELDS: usize = 5;

#[derive(Debug, Error, PartialEq)]
pub enum ReplyError {
    #[error("empty line")]
    Empty,
    #[error("reply is not valid UTF-8")]
    NotUtf8,
    #[error("expected {expected} fields, got {got}")]
    FieldCount { expected: usize, got: usize },
    #[error("field {index} is not a number: {text:?}")]
    BadNumber { index: usize, text: String },
}

/// Status line exactly as the device reports it: integers, millidegrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawStatus {
    pub adc_raw: i64,
    pub adc_voltage: i64,
    pub temp_millideg: i64,
    pub profile_step: i32,
    pub desired_millideg: i64,
}

/// Strip the line ending and reject lines with nothing in them.
pub fn line_text(line: &[u8]) -> Result<&str, ReplyError> {
    let s = std::str::from_utf8(line).map_err(|_| ReplyError::NotUtf8)?;
    let s = s.trim_matches(|c: char| c == '\r' || c == '\n' || c == ' ');
    if s.is_empty() {
        return Err(ReplyError::Empty);
    }
    Ok(s)
}

/// Decode a generic numeric reply into floats.
pub fn parse_fields(line: &[u8]) -> Result<Vec<f64>, ReplyError> {
    line_text(line)?
        .split(',')
        .enumerate()
        .map(|(index, tok)| {
            let tok = tok.trim();
            tok.parse::<f64>().map_err(|_| ReplyError::BadNumber {
                index,
                text: tok.to_string(),
            })
        })
        .collect()
}

/// Decode a `r` reply: `adc_raw,adc_voltage,temp_millideg,profile_step,desired_millideg`.
pub fn parse_status(line: &[u8]) -> Result<RawStatus, ReplyError> {
    let text = line_text(line)?;
    let toks: Vec<&str> = text.split(',').map(str::trim).collect();
    if toks.len() != STATUS_FIELDS {
        return Err(ReplyError::FieldCount {
            expected: STATUS_FIELDS,
            got: toks.len(),
        });
    }
    let int = |index: usize| -> Result<i64, ReplyError> {
        toks[index].parse::<i64>().map_err(|_| ReplyError::BadNumber {
            index,
            text: toks[index].to_string(),
        })
    };
    let step = int(3)?;
    let profile_step = i32::try_from(step).map_err(|_| ReplyError::BadNumber {
        index: 3,
        text: toks[3].to_string(),
    })?;
    Ok(RawStatus {
        adc_raw: int(0)?,
        adc_voltage: int(1)?,
        temp_millideg: int(2)?,
        profile_step,
        desired_millideg: int(4)?,
    })
}
