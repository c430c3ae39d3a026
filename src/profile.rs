use std::path::Path;

use anyhow::{Context, Result, bail};

/// One profile step: reach `temp_degc` at `seconds` after the run starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfilePoint {
    pub seconds: i32,
    pub temp_degc: i32,
}

impl ProfilePoint {
    pub fn time_ms(&self) -> Result<i32> {
        self.seconds
            .checked_mul(1000)
            .with_context(|| format!("time {}s out of range", self.seconds))
    }
}

/// Parse `seconds,degc` lines. Blank lines are skipped.
pub fn parse_profile(text: &str) -> Result<Vec<ProfilePoint>> {
    let mut points = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 2 {
            bail!("line {}: expected 2 fields, got {}", i + 1, fields.len());
        }
        let seconds = fields[0]
            .parse::<i32>()
            .with_context(|| format!("line {}: bad time {:?}", i + 1, fields[0]))?;
        let temp_degc = fields[1]
            .parse::<i32>()
            .with_context(|| format!("line {}: bad temperature {:?}", i + 1, fields[1]))?;
        points.push(ProfilePoint { seconds, temp_degc });
    }
    if points.is_empty() {
        bail!("profile is empty");
    }
    Ok(points)
}

pub fn load_profile(path: &Path) -> Result<Vec<ProfilePoint>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading profile {}", path.display()))?;
    parse_profile(&text).with_context(|| format!("parsing profile {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_pairs() {
        let pts = parse_profile("0,25\n90, 150\n\n180,217\r\n").unwrap();
        assert_eq!(
            pts,
            vec![
                ProfilePoint {
                    seconds: 0,
                    temp_degc: 25,
                },
                ProfilePoint {
                    seconds: 90,
                    temp_degc: 150,
                },
                ProfilePoint {
                    seconds: 180,
                    temp_degc: 217,
                },
            ]
        );
        assert_eq!(pts[1].time_ms().unwrap(), 90_000);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_profile("").is_err());
        assert!(parse_profile("\n\n").is_err());
        assert!(parse_profile("10,20,30\n").is_err());
        assert!(parse_profile("10\n").is_err());
        assert!(parse_profile("ten,20\n").is_err());
        assert!(parse_profile("10,20.5\n").is_err());
    }

    #[test]
    fn time_overflow_is_an_error() {
        let p = ProfilePoint {
            seconds: i32::MAX,
            temp_degc: 0,
        };
        assert!(p.time_ms().is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "0,25").unwrap();
        writeln!(f, "60,100").unwrap();
        let pts = load_profile(f.path()).unwrap();
        assert_eq!(pts.len(), 2);

        let missing = f.path().with_extension("missing");
        let err = load_profile(&missing).unwrap_err();
        assert!(format!("{err:#}").contains("reading profile"));
    }
}
