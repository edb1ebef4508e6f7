//! Directional exposure and the trade records it produces.

use chrono::{Duration, NaiveDateTime};
use std::collections::HashMap;
use std::fmt;

use super::signal::Metadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Position {
    Long,
    Short,
    #[default]
    Flat,
}

impl Position {
    /// +1 for long, -1 for short, 0 when flat.
    pub fn sign(self) -> f64 {
        match self {
            Position::Long => 1.0,
            Position::Short => -1.0,
            Position::Flat => 0.0,
        }
    }

    pub fn is_flat(self) -> bool {
        self == Position::Flat
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Position::Long => "LONG",
            Position::Short => "SHORT",
            Position::Flat => "FLAT",
        };
        f.write_str(name)
    }
}

pub const DEFAULT_TRADE_SIZE: f64 = 1.0;

/// A realized or still-open position record.
///
/// Created open by the execution loop on an approved entry and closed at
/// most once by the matching exit.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub entry_price: f64,
    pub entry_time: NaiveDateTime,
    pub position: Position,
    pub size: f64,
    pub exit_price: Option<f64>,
    pub exit_time: Option<NaiveDateTime>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub metadata: Metadata,
}

impl Trade {
    pub fn open(
        entry_price: f64,
        entry_time: NaiveDateTime,
        position: Position,
        size: f64,
    ) -> Self {
        Trade {
            entry_price,
            entry_time,
            position,
            size,
            exit_price: None,
            exit_time: None,
            stop_loss: None,
            take_profit: None,
            metadata: HashMap::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.exit_time.is_none()
    }

    /// Sets the exit fields. Returns false and leaves the trade untouched
    /// if it was already closed.
    pub fn close(&mut self, exit_price: f64, exit_time: NaiveDateTime) -> bool {
        if !self.is_open() {
            return false;
        }
        self.exit_price = Some(exit_price);
        self.exit_time = Some(exit_time);
        true
    }

    pub fn duration(&self) -> Duration {
        match self.exit_time {
            Some(exit) => exit - self.entry_time,
            None => Duration::zero(),
        }
    }

    /// (exit - entry) * sign * size; zero while open.
    pub fn profit(&self) -> f64 {
        match self.exit_price {
            Some(exit) => (exit - self.entry_price) * self.position.sign() * self.size,
            None => 0.0,
        }
    }

    /// Mark-to-market profit of an open trade at `mark`. Closed trades
    /// report zero, their profit being realized.
    pub fn unrealized_profit(&self, mark: f64) -> f64 {
        if self.is_open() {
            (mark - self.entry_price) * self.position.sign() * self.size
        } else {
            0.0
        }
    }
}
