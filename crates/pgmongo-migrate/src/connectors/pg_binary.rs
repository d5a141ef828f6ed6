//! Decoders for PostgreSQL binary values that have no lossless native type.
//!
//! NUMERIC is rendered as exact decimal text at any precision. Timestamps
//! and dates are range-checked, so `infinity` and years outside chrono's
//! range come back as values or errors instead of overflowing.

use chrono::{DateTime, NaiveDate, Utc};

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// 2000-01-01 00:00:00 UTC in Unix microseconds.
const PG_EPOCH_MICROS: i64 = 946_684_800_000_000;

/// 2000-01-01 counted in days from 0001-01-01 (day 1).
const PG_EPOCH_DAYS_FROM_CE: i32 = 730_120;

/// A timestamp or date, which PostgreSQL lets be infinite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Temporal<T> {
    /// An ordinary point in time.
    Finite(T),
    /// `infinity`
    Infinity,
    /// `-infinity`
    NegativeInfinity,
}

fn read_u16(bytes: &[u8], at: usize) -> Result<u16, String> {
    bytes
        .get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| format!("value truncated at byte {}", at))
}

fn fixed<const N: usize>(bytes: &[u8], what: &str) -> Result<[u8; N], String> {
    bytes
        .try_into()
        .map_err(|_| format!("{} value has {} bytes, expected {}", what, bytes.len(), N))
}

/// Renders a binary NUMERIC as decimal text.
///
/// Layout: `ndigits`, `weight`, `sign` and `dscale` as 16-bit big-endian
/// words, then `ndigits` base-10000 digits, most significant first. The
/// first digit is worth `10000^weight`. The text carries exactly `dscale`
/// fractional digits, as `psql` prints it.
pub fn decode_numeric(bytes: &[u8]) -> Result<String, String> {
    let ndigits = usize::from(read_u16(bytes, 0)?);
    let weight = i32::from(read_u16(bytes, 2)? as i16);
    let sign = read_u16(bytes, 4)?;
    let dscale = usize::from(read_u16(bytes, 6)?);

    let negative = match sign {
        NUMERIC_POS => false,
        NUMERIC_NEG => true,
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        other => return Err(format!("invalid NUMERIC sign 0x{:04X}", other)),
    };

    let digits = (0..ndigits)
        .map(|i| read_u16(bytes, 8 + 2 * i))
        .collect::<Result<Vec<u16>, String>>()?;
    if let Some(bad) = digits.iter().find(|d| **d > 9999) {
        return Err(format!("invalid NUMERIC digit {}", bad));
    }
    // Positions before the first stored digit or past the last are zero.
    let digit = |position: i32| -> u16 {
        usize::try_from(position)
            .ok()
            .and_then(|i| digits.get(i))
            .copied()
            .unwrap_or(0)
    };

    let mut text = String::new();
    if negative && !digits.is_empty() {
        text.push('-');
    }
    if weight < 0 {
        text.push('0');
    } else {
        text.push_str(&digit(0).to_string());
        for position in 1..=weight {
            text.push_str(&format!("{:04}", digit(position)));
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut position = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit(position)));
            position += 1;
        }
        fraction.truncate(dscale);
        text.push('.');
        text.push_str(&fraction);
    }

    Ok(text)
}

/// Decodes a binary TIMESTAMP or TIMESTAMPTZ (microseconds from 2000-01-01).
pub fn decode_timestamp(bytes: &[u8]) -> Result<Temporal<DateTime<Utc>>, String> {
    let micros = i64::from_be_bytes(fixed::<8>(bytes, "timestamp")?);
    match micros {
        i64::MAX => Ok(Temporal::Infinity),
        i64::MIN => Ok(Temporal::NegativeInfinity),
        _ => micros
            .checked_add(PG_EPOCH_MICROS)
            .and_then(|unix| {
                let nanos = (unix.rem_euclid(1_000_000) * 1_000) as u32;
                DateTime::from_timestamp(unix.div_euclid(1_000_000), nanos)
            })
            .map(Temporal::Finite)
            .ok_or_else(|| format!("timestamp {}us after 2000-01-01 is out of range", micros)),
    }
}

/// Decodes a binary DATE (days from 2000-01-01).
pub fn decode_date(bytes: &[u8]) -> Result<Temporal<NaiveDate>, String> {
    let days = i32::from_be_bytes(fixed::<4>(bytes, "date")?);
    match days {
        i32::MAX => Ok(Temporal::Infinity),
        i32::MIN => Ok(Temporal::NegativeInfinity),
        _ => days
            .checked_add(PG_EPOCH_DAYS_FROM_CE)
            .and_then(NaiveDate::from_num_days_from_ce_opt)
            .map(Temporal::Finite)
            .ok_or_else(|| format!("date {} days after 2000-01-01 is out of range", days)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn numeric(weight: i16, sign: u16, dscale: u16, digits: &[u16]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend((digits.len() as u16).to_be_bytes());
        bytes.extend(weight.to_be_bytes());
        bytes.extend(sign.to_be_bytes());
        bytes.extend(dscale.to_be_bytes());
        for d in digits {
            bytes.extend(d.to_be_bytes());
        }
        bytes
    }

    #[test]
    fn test_numeric_keeps_display_scale() {
        // 10.50 is stored as [10, 5000] with the trailing zero digit in dscale.
        let bytes = numeric(0, NUMERIC_POS, 2, &[10, 5000]);
        assert_eq!(decode_numeric(&bytes).unwrap(), "10.50");
    }

    #[test]
    fn test_numeric_beyond_28_digits() {
        // 123456789012345678901234567890.123456789
        let bytes = numeric(
            7,
            NUMERIC_POS,
            9,
            &[12, 3456, 7890, 1234, 5678, 9012, 3456, 7890, 1234, 5678, 9000],
        );
        assert_eq!(
            decode_numeric(&bytes).unwrap(),
            "123456789012345678901234567890.123456789"
        );
    }

    #[test]
    fn test_numeric_small_fraction() {
        assert_eq!(decode_numeric(&numeric(-1, NUMERIC_POS, 3, &[10])).unwrap(), "0.001");
        assert_eq!(
            decode_numeric(&numeric(-2, NUMERIC_POS, 8, &[5])).unwrap(),
            "0.00000005"
        );
    }

    #[test]
    fn test_numeric_trailing_integer_groups() {
        assert_eq!(decode_numeric(&numeric(2, NUMERIC_POS, 0, &[1])).unwrap(), "100000000");
    }

    #[test]
    fn test_numeric_negative_and_zero() {
        assert_eq!(decode_numeric(&numeric(0, NUMERIC_NEG, 0, &[2])).unwrap(), "-2");
        assert_eq!(decode_numeric(&numeric(0, NUMERIC_POS, 2, &[])).unwrap(), "0.00");
    }

    #[test]
    fn test_numeric_special_values() {
        assert_eq!(decode_numeric(&numeric(0, NUMERIC_NAN, 0, &[])).unwrap(), "NaN");
        assert_eq!(decode_numeric(&numeric(0, NUMERIC_PINF, 0, &[])).unwrap(), "Infinity");
        assert_eq!(decode_numeric(&numeric(0, NUMERIC_NINF, 0, &[])).unwrap(), "-Infinity");
    }

    #[test]
    fn test_numeric_rejects_malformed() {
        assert!(decode_numeric(&[0, 1, 0]).is_err());
        assert!(decode_numeric(&numeric(0, 0x1234, 0, &[1])).is_err());
        assert!(decode_numeric(&numeric(0, NUMERIC_POS, 0, &[10_000])).is_err());

        let mut truncated = numeric(1, NUMERIC_POS, 0, &[1, 2]);
        truncated.pop();
        assert!(decode_numeric(&truncated).is_err());
    }

    #[test]
    fn test_timestamp_epoch_and_offset() {
        let at = decode_timestamp(&0_i64.to_be_bytes()).unwrap();
        let expected = NaiveDateTime::parse_from_str("2000-01-01 00:00:00", "%Y-%m-%d %H:%M:%S")
            .unwrap()
            .and_utc();
        assert_eq!(at, Temporal::Finite(expected));

        let before = decode_timestamp(&(-1_000_000_i64).to_be_bytes()).unwrap();
        let expected = NaiveDateTime::parse_from_str("1999-12-31 23:59:59", "%Y-%m-%d %H:%M:%S")
            .unwrap()
            .and_utc();
        assert_eq!(before, Temporal::Finite(expected));
    }

    #[test]
    fn test_timestamp_infinity() {
        assert_eq!(decode_timestamp(&i64::MAX.to_be_bytes()).unwrap(), Temporal::Infinity);
        assert_eq!(
            decode_timestamp(&i64::MIN.to_be_bytes()).unwrap(),
            Temporal::NegativeInfinity
        );
    }

    #[test]
    fn test_timestamp_beyond_chrono_range_is_error() {
        // Year 290000, valid in PostgreSQL, past chrono's last year.
        let micros: i64 = 9_088_000_000_000_000_000;
        assert!(decode_timestamp(&micros.to_be_bytes()).is_err());
        assert!(decode_timestamp(&[0, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_date_offset_and_infinity() {
        let next_day = decode_date(&1_i32.to_be_bytes()).unwrap();
        assert_eq!(
            next_day,
            Temporal::Finite(NaiveDate::from_ymd_opt(2000, 1, 2).unwrap())
        );
        assert_eq!(decode_date(&i32::MAX.to_be_bytes()).unwrap(), Temporal::Infinity);
        assert_eq!(
            decode_date(&i32::MIN.to_be_bytes()).unwrap(),
            Temporal::NegativeInfinity
        );
        assert!(decode_date(&2_000_000_000_i32.to_be_bytes()).is_err());
    }
}
