//! Track addresses: km numbers and track meters.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// A kilometer number along a track number, with an optional letter
/// extension for inserted kilometers, e.g. `0003` or `0003A`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KmNumber {
    number: u32,
    extension: Option<String>,
}

impl KmNumber {
    pub const ZERO: KmNumber = KmNumber {
        number: 0,
        extension: None,
    };

    pub fn new(number: u32) -> Self {
        Self {
            number,
            extension: None,
        }
    }

    pub fn with_extension(number: u32, extension: impl Into<String>) -> Self {
        Self {
            number,
            extension: Some(extension.into()),
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }
}

impl fmt::Display for KmNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{}", self.number, self.extension.as_deref().unwrap_or(""))
    }
}

impl FromStr for KmNumber {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let digits = value.chars().take_while(char::is_ascii_digit).count();
        if digits == 0 {
            return Err(Error::InvalidData(format!("invalid km number: {value}")));
        }
        let number = value[..digits]
            .parse()
            .map_err(|_| Error::InvalidData(format!("invalid km number: {value}")))?;
        let extension = &value[digits..];
        if extension.is_empty() {
            Ok(KmNumber::new(number))
        } else if extension.chars().all(|c| c.is_ascii_uppercase()) {
            Ok(KmNumber::with_extension(number, extension))
        } else {
            Err(Error::InvalidData(format!("invalid km number: {value}")))
        }
    }
}

/// An address along a track: km number plus meters within the
/// kilometer, e.g. `0003+0125.500`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackMeter {
    pub km_number: KmNumber,
    pub meters: f64,
}

impl TrackMeter {
    pub fn new(km_number: KmNumber, meters: f64) -> Self {
        Self { km_number, meters }
    }

    /// Formats with the given number of decimals, e.g. `0003+0125.500`.
    pub fn format_with_decimals(&self, decimals: usize) -> String {
        let width = if decimals > 0 { 5 + decimals } else { 4 };
        format!(
            "{}+{:0width$.decimals$}",
            self.km_number,
            self.meters,
            width = width,
            decimals = decimals
        )
    }
}

impl fmt::Display for TrackMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_with_decimals(3))
    }
}

impl PartialEq for TrackMeter {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TrackMeter {}

impl PartialOrd for TrackMeter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TrackMeter {
    fn cmp(&self, other: &Self) -> Ordering {
        self.km_number
            .cmp(&other.km_number)
            .then_with(|| self.meters.total_cmp(&other.meters))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn km_number_parsing_and_formatting() {
        assert_eq!("0003".parse::<KmNumber>().unwrap(), KmNumber::new(3));
        assert_eq!(
            "0124B".parse::<KmNumber>().unwrap(),
            KmNumber::with_extension(124, "B")
        );
        assert_eq!(KmNumber::with_extension(3, "A").to_string(), "0003A");
        assert!("".parse::<KmNumber>().is_err());
        assert!("12b".parse::<KmNumber>().is_err());
    }

    #[test]
    fn km_number_ordering_puts_extensions_after_the_plain_km() {
        let mut numbers = vec![
            KmNumber::new(4),
            KmNumber::with_extension(3, "A"),
            KmNumber::new(3),
        ];
        numbers.sort();
        assert_eq!(
            numbers,
            vec![
                KmNumber::new(3),
                KmNumber::with_extension(3, "A"),
                KmNumber::new(4),
            ]
        );
    }

    #[test]
    fn track_meter_formatting() {
        let address = TrackMeter::new(KmNumber::new(3), 125.5);
        assert_eq!(address.to_string(), "0003+0125.500");
        assert_eq!(address.format_with_decimals(0), "0003+0126");
        assert_eq!(
            TrackMeter::new(KmNumber::with_extension(12, "A"), 7.25).to_string(),
            "0012A+0007.250"
        );
    }

    #[test]
    fn track_meter_serializes_as_a_plain_value() {
        let address = TrackMeter::new(KmNumber::with_extension(3, "A"), 125.5);
        let json = serde_json::to_string(&address).unwrap();
        let back: TrackMeter = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);
    }

    #[test]
    fn track_meter_ordering_compares_km_then_meters() {
        let a = TrackMeter::new(KmNumber::new(3), 999.0);
        let b = TrackMeter::new(KmNumber::new(4), 0.0);
        let c = TrackMeter::new(KmNumber::new(4), 0.5);
        assert!(a < b && b < c);
        assert_eq!(b, TrackMeter::new(KmNumber::new(4), 0.0));
    }
}
