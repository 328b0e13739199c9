//! Timestamp literals of the form `YYYY/MM/DD.hh:mm:ss`

use chrono::NaiveDateTime;

use super::error::{CompileError, LiteralKind};

const TIMESTAMP_FORMAT: &str = "%Y/%m/%d.%H:%M:%S";

/// Byte layout of a timestamp: `d` is a digit, anything else must match exactly
const TIMESTAMP_SHAPE: &[u8] = b"dddd/dd/dd.dd:dd:dd";

/// Parse a timestamp into epoch seconds
///
/// The format carries no zone and is read as UTC.
pub fn parse_timestamp(text: &str) -> Result<i64, CompileError> {
    let well_formed = text.len() == TIMESTAMP_SHAPE.len()
        && text
            .bytes()
            .zip(TIMESTAMP_SHAPE)
            .all(|(b, shape)| match shape {
                b'd' => b.is_ascii_digit(),
                sep => b == *sep,
            });

    if !well_formed {
        return Err(CompileError::format(
            LiteralKind::Timestamp,
            text,
            "expected YYYY/MM/DD.hh:mm:ss",
        ));
    }

    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .map(|dt| dt.and_utc().timestamp())
        .map_err(|e| CompileError::format(LiteralKind::Timestamp, text, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch() {
        assert_eq!(parse_timestamp("1970/01/01.00:00:00").unwrap(), 0);
    }

    #[test]
    fn test_utc_anchor() {
        // 2011-06-15T12:30:45Z
        assert_eq!(parse_timestamp("2011/06/15.12:30:45").unwrap(), 1_308_141_045);
        assert_eq!(parse_timestamp("2024/02/29.23:59:59").unwrap(), 1_709_251_199);
    }

    #[test]
    fn test_rejects_deviations() {
        let bad = [
            "2011/6/15.12:30:45",
            "2011-06-15.12:30:45",
            "2011/06/15 12:30:45",
            "2011/06/15.12:30",
            "2011/06/15.12:30:45Z",
            "2011/13/01.00:00:00",
            "2023/02/29.00:00:00",
            "2011/06/15.25:00:00",
        ];
        for text in bad {
            assert!(
                matches!(
                    parse_timestamp(text),
                    Err(CompileError::Format { kind: LiteralKind::Timestamp, .. })
                ),
                "{text} should be rejected"
            );
        }
    }
}
