use regex::Regex;
use std::sync::OnceLock;

use crate::error::{PackError, Result};

/// Longest viewing requirement a package may carry (one day).
pub const MAX_SECONDS: u32 = 86_400;

fn hms_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{2}):([0-5]\d):([0-5]\d)$").expect("static HH:MM:SS pattern")
    })
}

/// Parse a strict `HH:MM:SS` string into total seconds.
pub fn parse_hms(input: &str) -> Result<u32> {
    let caps = hms_pattern()
        .captures(input)
        .ok_or_else(|| PackError::InvalidDuration(input.to_string()))?;

    let field = |i: usize| -> Result<u32> {
        caps[i]
            .parse::<u32>()
            .map_err(|_| PackError::InvalidDuration(input.to_string()))
    };
    let total = field(1)? * 3600 + field(2)? * 60 + field(3)?;

    if total > MAX_SECONDS {
        return Err(PackError::DurationOutOfRange(total));
    }
    Ok(total)
}

pub fn format_hms(seconds: u32) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_durations() {
        assert_eq!(parse_hms("00:05:00").unwrap(), 300);
        assert_eq!(parse_hms("00:00:10").unwrap(), 10);
        assert_eq!(parse_hms("01:02:03").unwrap(), 3723);
        assert_eq!(parse_hms("24:00:00").unwrap(), MAX_SECONDS);
    }

    #[test]
    fn rejects_out_of_range_total() {
        assert!(matches!(
            parse_hms("25:00:00"),
            Err(PackError::DurationOutOfRange(90000))
        ));
        assert!(matches!(
            parse_hms("24:00:01"),
            Err(PackError::DurationOutOfRange(_))
        ));
    }

    #[test]
    fn rejects_wrong_shape() {
        let cases = [
            "5:00",
            "0:05:00",
            "00:60:00",
            "00:00:60",
            "aa:bb:cc",
            "",
            "00:05:00:00",
            " 00:00:01",
            "00:00:01\n",
        ];
        for bad in cases {
            assert!(
                matches!(parse_hms(bad), Err(PackError::InvalidDuration(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn formats_back() {
        assert_eq!(format_hms(10), "00:00:10");
        assert_eq!(format_hms(3723), "01:02:03");
        assert_eq!(format_hms(MAX_SECONDS), "24:00:00");
    }
}
