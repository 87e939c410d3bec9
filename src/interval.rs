/// Candle interval labels.
///
/// The label is validated as a well-formed duration string
/// (`<amount><unit>`, e.g. "1m", "4h", "1M") and otherwise passed
/// through to the exchange untouched.
///
/// IMPORTANT:
/// - The real candle width is always measured from data
///   (`close_time - open_time + 1`), never derived from the label.
///
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntervalUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    /// Calendar month ("M"), case-sensitive to keep it apart from minutes
    Month,
}

impl IntervalUnit {
    fn from_char(c: char) -> Option<Self> {
        match c {
            's' => Some(Self::Second),
            'm' => Some(Self::Minute),
            'h' => Some(Self::Hour),
            'd' => Some(Self::Day),
            'w' => Some(Self::Week),
            'M' => Some(Self::Month),
            _ => None,
        }
    }
}

/// A validated interval label such as "1m" or "1d".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Interval {
    label: String,
    unit: IntervalUnit,
}

impl Interval {
    pub fn as_str(&self) -> &str {
        &self.label
    }

    pub fn unit(&self) -> IntervalUnit {
        self.unit
    }
}

impl FromStr for Interval {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidInterval(s.to_string());

        let mut chars = s.chars();
        let unit = chars
            .next_back()
            .and_then(IntervalUnit::from_char)
            .ok_or_else(invalid)?;

        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let amount: u32 = digits.parse().map_err(|_| invalid())?;
        if amount == 0 {
            return Err(invalid());
        }

        Ok(Self {
            label: s.to_string(),
            unit,
        })
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}
