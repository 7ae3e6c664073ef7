//! Core types shared by the hardware layer and the daemon

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default long-press threshold for buttons, in milliseconds
pub const DEFAULT_LONG_PRESS_MS: u64 = 1500;

/// Electrical level of a digital pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    Low,
    High,
}

impl Level {
    /// Level from a raw 0/1 value; anything non-zero is high.
    pub fn from_raw(value: u8) -> Self {
        if value == 0 {
            Level::Low
        } else {
            Level::High
        }
    }

    /// Raw 0/1 value of this level
    pub fn as_raw(self) -> u8 {
        match self {
            Level::Low => 0,
            Level::High => 1,
        }
    }

    /// The opposite level
    pub fn inverted(self) -> Self {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_raw())
    }
}

/// Tri-state press status reported by press-duration-aware inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStatus {
    /// Not pressed
    #[default]
    Idle,
    /// Pressed for less than the long-press threshold
    ShortPress,
    /// Held at least the long-press threshold
    LongPress,
}

/// Direction of a level transition on an input pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// High to low
    Falling,
    /// Low to high
    Rising,
}

impl Edge {
    /// Edge between two levels, or `None` when the level did not change
    pub fn between(previous: Level, current: Level) -> Option<Self> {
        match (previous, current) {
            (Level::High, Level::Low) => Some(Edge::Falling),
            (Level::Low, Level::High) => Some(Edge::Rising),
            _ => None,
        }
    }
}

/// Which edges of a binding source propagate to its targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    #[serde(alias = "IRQ_FALLING", alias = "irq_falling")]
    Falling,
    #[serde(alias = "IRQ_RISING", alias = "irq_rising")]
    Rising,
    #[default]
    #[serde(
        alias = "IRQ_RISING_FALLING",
        alias = "irq_rising_falling",
        alias = "rising_falling"
    )]
    Both,
}

impl TriggerMode {
    /// Whether `edge` fires under this mode
    pub fn matches(self, edge: Edge) -> bool {
        match self {
            TriggerMode::Falling => edge == Edge::Falling,
            TriggerMode::Rising => edge == Edge::Rising,
            TriggerMode::Both => true,
        }
    }
}

/// Snapshot of the four interlock sensors, in `(in, out, up, down)` order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SensorPattern {
    pub inside: bool,
    pub outside: bool,
    pub up: bool,
    pub down: bool,
}

impl SensorPattern {
    pub const fn new(inside: bool, outside: bool, up: bool, down: bool) -> Self {
        Self {
            inside,
            outside,
            up,
            down,
        }
    }
}

impl fmt::Display for SensorPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(in={}, out={}, up={}, down={})",
            self.inside, self.outside, self.up, self.down
        )
    }
}

/// One positional argument of a serial command
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Int(i64),
    Float(f64),
    Str(String),
}

impl Arg {
    /// Coerce a token: integer first, then float, else the raw string.
    pub fn coerce(token: &str) -> Self {
        if let Ok(value) = token.parse::<i64>() {
            return Arg::Int(value);
        }
        if let Ok(value) = token.parse::<f64>() {
            return Arg::Float(value);
        }
        Arg::Str(token.to_string())
    }

    /// Truthiness: non-zero numbers and non-empty strings are true
    pub fn is_truthy(&self) -> bool {
        match self {
            Arg::Int(v) => *v != 0,
            Arg::Float(v) => *v != 0.0,
            Arg::Str(s) => !s.is_empty(),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Arg::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Textual form of the argument, as it appeared on the wire
    pub fn as_text(&self) -> String {
        self.to_string()
    }

    /// JSON representation used when persisting fixture parameters
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Arg::Int(v) => serde_json::Value::from(*v),
            Arg::Float(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Arg::Str(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Int(v) => write!(f, "{}", v),
            Arg::Float(v) => write!(f, "{}", v),
            Arg::Str(s) => f.write_str(s),
        }
    }
}

/// Parse result of one serial command line
#[derive(Debug, Clone, PartialEq)]
pub struct CommandFrame {
    /// Lower-cased command name
    pub name: String,
    /// Coerced positional arguments
    pub args: Vec<Arg>,
}

impl CommandFrame {
    /// Parse a raw line (without or with its trailing line feed).
    ///
    /// The line is decoded lossily, trimmed, lower-cased and split on single
    /// spaces; consecutive spaces therefore yield empty string arguments.
    pub fn parse(line: &[u8]) -> Self {
        let text = String::from_utf8_lossy(line).trim().to_lowercase();
        let mut tokens = text.split(' ');
        let name = tokens.next().unwrap_or_default().to_string();
        let args = tokens.map(Arg::coerce).collect();
        Self { name, args }
    }
}
