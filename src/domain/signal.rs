//! Strategy signals: intents to enter or exit a position.

use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::fmt;

use super::position::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalType {
    EntryLong,
    EntryShort,
    ExitLong,
    ExitShort,
}

impl SignalType {
    pub fn is_entry(self) -> bool {
        matches!(self, SignalType::EntryLong | SignalType::EntryShort)
    }

    pub fn is_exit(self) -> bool {
        !self.is_entry()
    }

    /// Direction this signal opens (entries) or closes (exits).
    pub fn position(self) -> Position {
        match self {
            SignalType::EntryLong | SignalType::ExitLong => Position::Long,
            SignalType::EntryShort | SignalType::ExitShort => Position::Short,
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalType::EntryLong => "ENTRY_LONG",
            SignalType::EntryShort => "ENTRY_SHORT",
            SignalType::ExitLong => "EXIT_LONG",
            SignalType::ExitShort => "EXIT_SHORT",
        };
        f.write_str(name)
    }
}

/// Free-form value attached to a signal or trade.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Number(f64),
    Text(String),
    Flag(bool),
}

impl MetadataValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            MetadataValue::Number(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Number(v)
    }
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::Text(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::Text(v)
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Flag(v)
    }
}

pub type Metadata = HashMap<String, MetadataValue>;

#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub signal_type: SignalType,
    pub price: f64,
    pub timestamp: NaiveDateTime,
    pub metadata: Metadata,
}

impl Signal {
    pub fn new(signal_type: SignalType, price: f64, timestamp: NaiveDateTime) -> Self {
        Signal {
            signal_type,
            price,
            timestamp,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn metadata_number(&self, key: &str) -> Option<f64> {
        self.metadata.get(key).and_then(MetadataValue::as_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn entry_and_exit_classification() {
        assert!(SignalType::EntryLong.is_entry());
        assert!(SignalType::EntryShort.is_entry());
        assert!(SignalType::ExitLong.is_exit());
        assert!(SignalType::ExitShort.is_exit());
    }

    #[test]
    fn signal_direction() {
        assert_eq!(SignalType::EntryLong.position(), Position::Long);
        assert_eq!(SignalType::ExitLong.position(), Position::Long);
        assert_eq!(SignalType::EntryShort.position(), Position::Short);
        assert_eq!(SignalType::ExitShort.position(), Position::Short);
    }

    #[test]
    fn display_uses_wire_names() {
        assert_eq!(SignalType::EntryLong.to_string(), "ENTRY_LONG");
        assert_eq!(SignalType::ExitShort.to_string(), "EXIT_SHORT");
    }

    #[test]
    fn new_signal_has_empty_metadata() {
        let s = Signal::new(SignalType::EntryLong, 100.0, ts());
        assert!(s.metadata.is_empty());
        assert_eq!(s.timestamp, ts());
    }

    #[test]
    fn metadata_number_lookup() {
        let s = Signal::new(SignalType::EntryLong, 100.0, ts())
            .with_metadata("atr", 2.5)
            .with_metadata("note", "breakout");
        assert_eq!(s.metadata_number("atr"), Some(2.5));
        assert_eq!(s.metadata_number("note"), None);
        assert_eq!(s.metadata_number("missing"), None);
    }
}
