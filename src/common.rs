use crate::console::Command;
use anyhow::anyhow;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

pub const RELAY_COUNT: usize = 4;

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct SensorResponse {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
}

/// Zero-based relay slot; the device and the console count from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayIndex(usize);

impl RelayIndex {
    pub fn new(index: usize) -> Option<RelayIndex> {
        if index < RELAY_COUNT {
            Some(RelayIndex(index))
        } else {
            None
        }
    }

    pub fn get(self) -> usize {
        self.0
    }

    pub fn number(self) -> usize {
        self.0 + 1
    }
}

impl FromStr for RelayIndex {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(RelayIndex::new)
            .ok_or_else(|| anyhow!("unknown relay (value: {}), expected 1..={}.", s, RELAY_COUNT))
    }
}

impl fmt::Display for RelayIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelayCommand {
    pub relay: RelayIndex,
    pub state: bool,
    pub duration_secs: i64,
}

impl RelayCommand {
    pub fn form_body(&self) -> String {
        format!(
            "relay={}&state={}&duration={}",
            self.relay.number(),
            self.state,
            self.duration_secs
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Routine {
    pub relay: RelayIndex,
    pub hour: i64,
    pub minute: i64,
    pub duration_min: i64,
}

impl Routine {
    pub fn form_body(&self) -> String {
        format!(
            "relay={}&hour={}&minute={}&duration={}",
            self.relay.number(),
            self.hour,
            self.minute,
            self.duration_min
        )
    }
}

#[derive(Debug)]
pub enum Task {
    Sensor(Box<anyhow::Result<SensorResponse>>),
    Command(Command),
    RelayDone(RelayCommand, anyhow::Result<()>),
    RoutineDone(Routine, anyhow::Result<()>),
}

/// Reads form text the way a browser number field's `parseInt(v) || 0` does:
/// leading whitespace, optional sign, leading digits; anything else is zero.
pub fn parse_int_or_zero(text: &str) -> i64 {
    let trimmed = text.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let value = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, d| {
            acc.saturating_mul(10).saturating_add(i64::from(d - b'0'))
        });

    if negative {
        -value
    } else {
        value
    }
}
