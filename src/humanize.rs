//! Human-readable size formatting and parsing utilities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid size format: {0}")]
    InvalidFormat(String),

    #[error("Invalid number: {0}")]
    InvalidNumber(#[from] std::num::ParseIntError),

    #[error("Invalid unit: {0}")]
    InvalidUnit(String),

    #[error("Size overflows: {0}")]
    Overflow(String),
}

const UNITS: &[(&str, u64)] = &[
    ("TB", 1 << 40),
    ("GB", 1 << 30),
    ("MB", 1 << 20),
    ("KB", 1 << 10),
];

/// Byte size wrapper with human-readable parsing (`"5MB"`, `"512KB"`, `1024`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Size as `usize`, saturating on 32-bit targets
    pub fn as_usize(&self) -> usize {
        usize::try_from(self.0).unwrap_or(usize::MAX)
    }

    /// Largest whole unit, with one decimal when the remainder is significant
    pub fn to_human_readable(&self) -> String {
        for &(unit, divisor) in UNITS {
            if self.0 >= divisor {
                let whole = self.0 / divisor;
                let tenth = (self.0 % divisor) * 10 / divisor;
                return if tenth > 0 {
                    format!("{whole}.{tenth}{unit}")
                } else {
                    format!("{whole}{unit}")
                };
            }
        }

        format!("{}B", self.0)
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct ByteSizeVisitor;

        impl serde::de::Visitor<'_> for ByteSizeVisitor {
            type Value = ByteSize;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a byte size as string (e.g., \"5MB\", \"1GB\") or integer")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(ByteSize(v))
            }

            // TOML and environment overrides hand integers over as i64
            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                u64::try_from(v)
                    .map(ByteSize)
                    .map_err(|_| E::custom(format!("byte size cannot be negative: {v}")))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                v.parse::<ByteSize>().map_err(serde::de::Error::custom)
            }
        }

        deserializer.deserialize_any(ByteSizeVisitor)
    }
}

impl FromStr for ByteSize {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_uppercase();

        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (num_str, unit) = s.split_at(split);
        if num_str.is_empty() {
            return Err(ParseError::InvalidFormat(s.to_string()));
        }

        let num: u64 = num_str.parse()?;

        let multiplier: u64 = match unit.trim() {
            "" | "B" => 1,
            "K" | "KB" | "KIB" => 1 << 10,
            "M" | "MB" | "MIB" => 1 << 20,
            "G" | "GB" | "GIB" => 1 << 30,
            "T" | "TB" | "TIB" => 1 << 40,
            other => return Err(ParseError::InvalidUnit(other.to_string())),
        };

        num.checked_mul(multiplier)
            .map(ByteSize)
            .ok_or_else(|| ParseError::Overflow(s.to_string()))
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_human_readable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_units() {
        assert_eq!("1024".parse::<ByteSize>().unwrap().as_u64(), 1024);
        assert_eq!("1KB".parse::<ByteSize>().unwrap().as_u64(), 1024);
        assert_eq!("5 MB".parse::<ByteSize>().unwrap().as_u64(), 5 * 1024 * 1024);
        assert_eq!("5mib".parse::<ByteSize>().unwrap().as_u64(), 5 * 1024 * 1024);
        assert_eq!("1G".parse::<ByteSize>().unwrap().as_u64(), 1 << 30);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "MB".parse::<ByteSize>(),
            Err(ParseError::InvalidFormat(_))
        ));
        assert!(matches!(
            "5XB".parse::<ByteSize>(),
            Err(ParseError::InvalidUnit(_))
        ));
        assert!(matches!(
            "99999999999TB".parse::<ByteSize>(),
            Err(ParseError::Overflow(_))
        ));
    }

    #[test]
    fn test_to_human_readable() {
        assert_eq!(ByteSize(512).to_human_readable(), "512B");
        assert_eq!(ByteSize(1024).to_human_readable(), "1KB");
        assert_eq!(ByteSize(5 * 1024 * 1024).to_human_readable(), "5MB");
        assert_eq!(ByteSize(1536 * 1024).to_human_readable(), "1.5MB");
    }

    #[test]
    fn test_deserialize_string_and_integer() {
        #[derive(Deserialize)]
        struct Engine {
            part_size: ByteSize,
            max_payload_bytes: ByteSize,
        }

        let parsed: Engine = toml::from_str(
            r#"
part_size = "8MB"
max_payload_bytes = 4096
"#,
        )
        .unwrap();
        assert_eq!(parsed.part_size.as_u64(), 8 * 1024 * 1024);
        assert_eq!(parsed.max_payload_bytes.as_u64(), 4096);
    }

    #[test]
    fn test_negative_integer_rejected() {
        let result: Result<ByteSize, _> = serde_json::from_str("-1");
        assert!(result.is_err());
    }

    #[test]
    fn test_as_usize() {
        assert_eq!(ByteSize(5 * 1024 * 1024).as_usize(), 5 * 1024 * 1024);
    }
}
