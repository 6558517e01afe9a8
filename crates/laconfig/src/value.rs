//! typed value coercion
//!
//! All values are stored as strings. [FromValue] converts the (evaluated) string into typed values:
//! - integers of every width, with `0x` (hex) and `0b` (binary) literals and an optional sign
//! - `f32`/`f64`, which also serve decimal values
//! - booleans: `true/false`, `yes/no`, `on/off`, `1/0` (case-insensitive)
//! - `chrono` date/times: RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff]`, `YYYY-MM-DD`
//! - `uuid::Uuid`
//! - byte arrays: `0a,ff,10` (comma separated hex) or `0aff10` / `0x0aff10`
//!
//! Surrounding whitespace is ignored by every conversion except `String`.
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

pub trait FromValue: Sized {
    /// Used in coercion error messages
    const TYPE_NAME: &'static str;

    fn from_value(value: &str) -> Option<Self>;
}

impl FromValue for String {
    const TYPE_NAME: &'static str = "string";

    fn from_value(value: &str) -> Option<Self> {
        Some(value.to_string())
    }
}

impl FromValue for bool {
    const TYPE_NAME: &'static str = "bool";

    fn from_value(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }
}

/// Parse an integer literal, accepting `0x` and `0b` prefixes
pub fn parse_integer(value: &str) -> Option<i128> {
    let value = value.trim();
    let (negative, digits) = match value.as_bytes().first()? {
        b'-' => (true, &value[1..]),
        b'+' => (false, &value[1..]),
        _ => (false, value),
    };

    let magnitude = if let Some(hex) = strip_prefix_ignore_case(digits, "0x") {
        i128::from_str_radix(hex, 16).ok()?
    } else if let Some(binary) = strip_prefix_ignore_case(digits, "0b") {
        i128::from_str_radix(binary, 2).ok()?
    } else {
        if !digits.bytes().all(|b| b.is_ascii_digit()) || digits.is_empty() {
            return None;
        }
        digits.parse::<i128>().ok()?
    };

    Some(if negative { -magnitude } else { magnitude })
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
        .filter(|rest| !rest.is_empty())
}

macro_rules! integer_from_value {
    ($($ty:ty),+) => {
        $(
            impl FromValue for $ty {
                const TYPE_NAME: &'static str = stringify!($ty);

                fn from_value(value: &str) -> Option<Self> {
                    parse_integer(value).and_then(|int| <$ty>::try_from(int).ok())
                }
            }
        )+
    };
}

integer_from_value!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

macro_rules! float_from_value {
    ($($ty:ty),+) => {
        $(
            impl FromValue for $ty {
                const TYPE_NAME: &'static str = stringify!($ty);

                fn from_value(value: &str) -> Option<Self> {
                    let value = value.trim();
                    if let Ok(float) = value.parse::<$ty>() {
                        return Some(float);
                    }
                    parse_integer(value).map(|int| int as $ty)
                }
            }
        )+
    };
}

float_from_value!(f32, f64);

const DATE_TIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

impl FromValue for NaiveDateTime {
    const TYPE_NAME: &'static str = "date-time";

    fn from_value(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Ok(with_offset) = DateTime::parse_from_rfc3339(value) {
            return Some(with_offset.naive_utc());
        }

        DATE_TIME_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
            .or_else(|| NaiveDate::from_value(value)?.and_hms_opt(0, 0, 0))
    }
}

impl FromValue for DateTime<Utc> {
    const TYPE_NAME: &'static str = "date-time";

    /// Values without offset are taken as UTC
    fn from_value(value: &str) -> Option<Self> {
        NaiveDateTime::from_value(value).map(|naive| naive.and_utc())
    }
}

impl FromValue for NaiveDate {
    const TYPE_NAME: &'static str = "date";

    fn from_value(value: &str) -> Option<Self> {
        NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
    }
}

impl FromValue for uuid::Uuid {
    const TYPE_NAME: &'static str = "guid";

    fn from_value(value: &str) -> Option<Self> {
        uuid::Uuid::parse_str(value.trim()).ok()
    }
}

impl FromValue for Vec<u8> {
    const TYPE_NAME: &'static str = "byte array";

    fn from_value(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.contains(',') {
            return value
                .split(',')
                .map(|pair| {
                    let pair = pair.trim();
                    let pair = strip_prefix_ignore_case(pair, "0x").unwrap_or(pair);
                    u8::from_str_radix(pair, 16).ok()
                })
                .collect();
        }

        let hex = strip_prefix_ignore_case(value, "0x").unwrap_or(value);
        if hex.len() % 2 != 0 || !hex.is_ascii() {
            return None;
        }

        (0..hex.len())
            .step_by(2)
            .map(|at| u8::from_str_radix(&hex[at..at + 2], 16).ok())
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn integers() {
        assert_eq!(i32::from_value(" 42 "), Some(42));
        assert_eq!(i32::from_value("-0x10"), Some(-16));
        assert_eq!(u8::from_value("0b1010"), Some(10));
        assert_eq!(u8::from_value("0XfF"), Some(255));
        assert_eq!(u8::from_value("256"), None);
        assert_eq!(i64::from_value("1.5"), None);
        assert_eq!(i64::from_value("0x"), None);
        assert_eq!(i64::from_value(""), None);
        assert_eq!(i64::from_value("-"), None);
    }

    #[test]
    fn floats() {
        assert_eq!(f64::from_value("175.4"), Some(175.4));
        assert_eq!(f64::from_value("0x10"), Some(16.0));
        assert_eq!(f32::from_value("nope"), None);
    }

    #[test]
    fn booleans() {
        assert_eq!(bool::from_value("TRUE"), Some(true));
        assert_eq!(bool::from_value("off"), Some(false));
        assert_eq!(bool::from_value("maybe"), None);
    }

    #[test]
    fn date_times() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|date| date.and_hms_opt(10, 30, 0))
            .unwrap();

        assert_eq!(
            NaiveDateTime::from_value("2024-03-01 10:30:00"),
            Some(expected)
        );
        assert_eq!(
            NaiveDateTime::from_value("2024-03-01T12:30:00+02:00"),
            Some(expected)
        );
        assert_eq!(
            DateTime::<Utc>::from_value("2024-03-01").map(|dt| dt.timestamp()),
            Some(1_709_251_200)
        );
        assert_eq!(NaiveDate::from_value("01.03.2024"), None);
    }

    #[test]
    fn guids() {
        let guid = uuid::Uuid::from_value("{67e55044-10b1-426f-9247-bb680e5fe0c8}");
        assert_eq!(
            guid.map(|g| g.to_string()).as_deref(),
            Some("67e55044-10b1-426f-9247-bb680e5fe0c8")
        );
        assert_eq!(uuid::Uuid::from_value("not a guid"), None);
    }

    #[test]
    fn byte_arrays() {
        let bytes = Vec::<u8>::from_value("0a, FF,0x10");
        assert_eq!(bytes, Some(vec![10, 255, 16]));
        assert_eq!(Vec::<u8>::from_value("0x0aff10"), Some(vec![10, 255, 16]));
        assert_eq!(Vec::<u8>::from_value("abc"), None);
        assert_eq!(Vec::<u8>::from_value("zz"), None);
    }
}
