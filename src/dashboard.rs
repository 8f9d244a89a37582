use crate::common::{
    parse_int_or_zero, RelayCommand, RelayIndex, Routine, SensorResponse, RELAY_COUNT,
};
use std::fmt::Write;

pub const PLACEHOLDER: &str = "--";

/// One decimal, halves rounded away from zero, `-0` shown as `0.0`.
fn format_reading(value: Option<f64>) -> String {
    let v = match value {
        Some(v) if v.is_finite() => v,
        _ => return PLACEHOLDER.to_string(),
    };
    if v == 0.0 {
        return "0.0".to_string();
    }

    let sign = if v < 0.0 { "-" } else { "" };
    let abs = v.abs();

    // An exact tie at one decimal is always an odd number of quarters.
    let quarters = abs * 4.0;
    if quarters.fract() == 0.0 && quarters < 9_007_199_254_740_992.0 {
        let quarters = quarters as u64;
        if quarters % 2 == 1 {
            let tenths = (quarters * 5 + 1) / 2;
            return format!("{}{}.{}", sign, tenths / 10, tenths % 10);
        }
    }

    format!("{}{:.1}", sign, abs)
}

fn or_zero(text: &str) -> &str {
    if text.is_empty() {
        "0"
    } else {
        text
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DurationForm {
    pub hours: String,
    pub minutes: String,
}

impl DurationForm {
    pub fn total_secs(&self) -> i64 {
        parse_int_or_zero(&self.hours)
            .saturating_mul(3600)
            .saturating_add(parse_int_or_zero(&self.minutes).saturating_mul(60))
    }

    pub fn label(&self) -> String {
        format!("Run for {}h {}m", or_zero(&self.hours), or_zero(&self.minutes))
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RoutineForm {
    pub hour: String,
    pub minute: String,
    pub duration_min: String,
}

impl RoutineForm {
    pub fn routine(&self, relay: RelayIndex) -> Routine {
        Routine {
            relay,
            hour: parse_int_or_zero(&self.hour),
            minute: parse_int_or_zero(&self.minute),
            duration_min: parse_int_or_zero(&self.duration_min),
        }
    }
}

/// Everything the operator sees. Lives as long as the session.
pub struct Dashboard {
    relay_names: [String; RELAY_COUNT],
    temperature: String,
    humidity: String,
    relay_states: [bool; RELAY_COUNT],
    durations: [DurationForm; RELAY_COUNT],
    routines: [RoutineForm; RELAY_COUNT],
}

impl Dashboard {
    pub fn new(relay_names: [String; RELAY_COUNT]) -> Dashboard {
        Dashboard {
            relay_names,
            temperature: PLACEHOLDER.to_string(),
            humidity: PLACEHOLDER.to_string(),
            relay_states: [false; RELAY_COUNT],
            durations: Default::default(),
            routines: Default::default(),
        }
    }

    pub fn temperature(&self) -> &str {
        &self.temperature
    }

    pub fn humidity(&self) -> &str {
        &self.humidity
    }

    pub fn relay_name(&self, relay: RelayIndex) -> &str {
        &self.relay_names[relay.get()]
    }

    pub fn relay_state(&self, relay: RelayIndex) -> bool {
        self.relay_states[relay.get()]
    }

    pub fn duration_form(&self, relay: RelayIndex) -> &DurationForm {
        &self.durations[relay.get()]
    }

    pub fn routine_form(&self, relay: RelayIndex) -> &RoutineForm {
        &self.routines[relay.get()]
    }

    pub fn apply_sensor(&mut self, response: &anyhow::Result<SensorResponse>) {
        match response {
            Ok(data) => {
                self.temperature = format_reading(data.temperature);
                self.humidity = format_reading(data.humidity);
            }
            Err(_) => {
                self.temperature = PLACEHOLDER.to_string();
                self.humidity = PLACEHOLDER.to_string();
            }
        }
    }

    pub fn toggle(&self, relay: RelayIndex) -> RelayCommand {
        self.switch(relay, !self.relay_state(relay))
    }

    pub fn switch(&self, relay: RelayIndex, state: bool) -> RelayCommand {
        RelayCommand {
            relay,
            state,
            duration_secs: 0,
        }
    }

    pub fn set_duration_form(&mut self, relay: RelayIndex, hours: &str, minutes: &str) {
        self.durations[relay.get()] = DurationForm {
            hours: hours.to_string(),
            minutes: minutes.to_string(),
        };
    }

    /// `None` when the form adds up to no time at all.
    pub fn run(&self, relay: RelayIndex) -> Option<RelayCommand> {
        let duration_secs = self.duration_form(relay).total_secs();
        if duration_secs <= 0 {
            return None;
        }
        Some(RelayCommand {
            relay,
            state: true,
            duration_secs,
        })
    }

    pub fn set_routine_form(
        &mut self,
        relay: RelayIndex,
        hour: &str,
        minute: &str,
        duration_min: &str,
    ) {
        self.routines[relay.get()] = RoutineForm {
            hour: hour.to_string(),
            minute: minute.to_string(),
            duration_min: duration_min.to_string(),
        };
    }

    pub fn routine(&self, relay: RelayIndex) -> Routine {
        self.routine_form(relay).routine(relay)
    }

    /// The relay takes the requested state once the device answered at all.
    pub fn apply_relay_done(&mut self, command: &RelayCommand, result: &anyhow::Result<()>) {
        if result.is_ok() {
            self.relay_states[command.relay.get()] = command.state;
        }
    }

    pub fn routine_confirmation(&self, routine: &Routine) -> String {
        format!(
            "Routine set for {} at {}:{} for {} minutes",
            self.relay_name(routine.relay),
            routine.hour,
            routine.minute,
            routine.duration_min
        )
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Temperature: {} °C", self.temperature);
        let _ = writeln!(out, "Humidity: {} %", self.humidity);

        for index in 0..RELAY_COUNT {
            let routine = &self.routines[index];
            let _ = writeln!(
                out,
                "[{}] {:<12} {:<3}  {:<18}  routine {}:{} for {} min",
                index + 1,
                self.relay_names[index],
                if self.relay_states[index] { "ON" } else { "OFF" },
                self.durations[index].label(),
                or_zero(&routine.hour),
                or_zero(&routine.minute),
                or_zero(&routine.duration_min),
            );
        }

        out
    }
}
