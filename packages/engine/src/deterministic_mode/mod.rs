use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::functions::{timestamp, uuid_v7, LixFunctionProvider};

pub(crate) const DETERMINISTIC_MODE_KEY: &str = "lix_deterministic_mode";
const DETERMINISTIC_UUID_COUNTER_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterministicSettings {
    pub enabled: bool,
    pub uuid_v7_enabled: bool,
    pub timestamp_enabled: bool,
    pub timestamp_shuffle_enabled: bool,
}

impl DeterministicSettings {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            uuid_v7_enabled: true,
            timestamp_enabled: true,
            timestamp_shuffle_enabled: false,
        }
    }

    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::disabled()
        }
    }

    /// Reads the `lix_deterministic_mode` key-value payload, e.g.
    /// `{"enabled": true, "timestamp_shuffle": 1}`.
    pub fn from_mode_value(value: &JsonValue) -> Self {
        let Some(object) = value.as_object() else {
            return Self::disabled();
        };
        let flag = |name: &str| object.get(name).and_then(loose_bool);
        if flag("enabled") != Some(true) {
            return Self::disabled();
        }
        Self {
            enabled: true,
            uuid_v7_enabled: flag("uuid_v7") != Some(false),
            timestamp_enabled: flag("timestamp") != Some(false),
            timestamp_shuffle_enabled: flag("timestamp_shuffle") == Some(true),
        }
    }
}

impl Default for DeterministicSettings {
    fn default() -> Self {
        Self::disabled()
    }
}

/// `true`/`1`/`"1"` are on, `false`/`0`/`"0"`/`""`/`[]` are off, anything else
/// is unset.
fn loose_bool(value: &JsonValue) -> Option<bool> {
    match value {
        JsonValue::Bool(boolean) => Some(*boolean),
        JsonValue::Number(number) => match number.as_f64() {
            Some(n) if n == 1.0 => Some(true),
            Some(n) if n == 0.0 => Some(false),
            _ => None,
        },
        JsonValue::String(text) if text == "1" => Some(true),
        JsonValue::String(text) if text.is_empty() || text == "0" => Some(false),
        JsonValue::Array(values) if values.is_empty() => Some(false),
        _ => None,
    }
}

/// Function provider stored inside the engine state, so the sequence is
/// rolled back together with a failed transaction and travels with exported
/// images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeFunctionProvider {
    settings: DeterministicSettings,
    next_sequence: i64,
}

impl RuntimeFunctionProvider {
    pub fn new(settings: DeterministicSettings, next_sequence: i64) -> Self {
        Self {
            settings,
            next_sequence,
        }
    }

    pub fn settings(&self) -> DeterministicSettings {
        self.settings
    }

    pub fn set_settings(&mut self, settings: DeterministicSettings) {
        self.settings = settings;
    }

    pub fn next_sequence(&self) -> i64 {
        self.next_sequence
    }

    fn take_sequence(&mut self) -> i64 {
        let current = self.next_sequence;
        self.next_sequence += 1;
        current
    }
}

impl Default for RuntimeFunctionProvider {
    fn default() -> Self {
        Self::new(DeterministicSettings::disabled(), 0)
    }
}

impl LixFunctionProvider for RuntimeFunctionProvider {
    fn uuid_v7(&mut self) -> String {
        if self.settings.enabled && self.settings.uuid_v7_enabled {
            let counter = self.take_sequence();
            let counter_bits = (counter as u64) & DETERMINISTIC_UUID_COUNTER_MASK;
            return format!("01920000-0000-7000-8000-{counter_bits:012x}");
        }
        uuid_v7()
    }

    fn timestamp(&mut self) -> String {
        if self.settings.enabled && self.settings.timestamp_enabled {
            let counter = self.take_sequence();
            let millis = if self.settings.timestamp_shuffle_enabled {
                shuffled_timestamp_millis(counter)
            } else {
                counter
            };
            let dt = chrono::DateTime::<chrono::Utc>::from_timestamp_millis(millis)
                .unwrap_or(chrono::DateTime::<chrono::Utc>::UNIX_EPOCH);
            return dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        }
        timestamp()
    }
}

/// Permutes counters within 1000-ms windows so tests catch code that relies
/// on timestamps being monotonic.
fn shuffled_timestamp_millis(counter: i64) -> i64 {
    const WINDOW: i64 = 1000;
    const MULTIPLIER: i64 = 733;
    const OFFSET: i64 = 271;

    let cycle = counter.div_euclid(WINDOW);
    let within = counter.rem_euclid(WINDOW);
    let shuffled = (within * MULTIPLIER + OFFSET).rem_euclid(WINDOW);
    cycle * WINDOW + shuffled
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{shuffled_timestamp_millis, DeterministicSettings, RuntimeFunctionProvider};
    use crate::functions::LixFunctionProvider;

    #[test]
    fn deterministic_ids_and_timestamps_share_one_counter() {
        let mut provider = RuntimeFunctionProvider::new(DeterministicSettings::enabled(), 0);

        assert_eq!(provider.uuid_v7(), "01920000-0000-7000-8000-000000000000");
        assert_eq!(provider.timestamp(), "1970-01-01T00:00:00.001Z");
        assert_eq!(provider.uuid_v7(), "01920000-0000-7000-8000-000000000002");
        assert_eq!(provider.next_sequence(), 3);
    }

    #[test]
    fn disabled_provider_does_not_advance_sequence() {
        let mut provider = RuntimeFunctionProvider::default();
        let _ = provider.uuid_v7();
        let _ = provider.timestamp();

        assert_eq!(provider.next_sequence(), 0);
    }

    #[test]
    fn uuid_only_mode_keeps_wall_clock_timestamps() {
        let settings = DeterministicSettings::from_mode_value(&json!({
            "enabled": true,
            "timestamp": false,
        }));
        let mut provider = RuntimeFunctionProvider::new(settings, 7);

        assert_eq!(provider.uuid_v7(), "01920000-0000-7000-8000-000000000007");
        assert_ne!(provider.timestamp(), "1970-01-01T00:00:00.008Z");
        assert_eq!(provider.next_sequence(), 8);
    }

    #[test]
    fn mode_value_parses_loose_flags() {
        let settings = DeterministicSettings::from_mode_value(&json!({
            "enabled": "1",
            "uuid_v7": 0,
            "timestamp_shuffle": 1,
        }));
        assert!(settings.enabled);
        assert!(!settings.uuid_v7_enabled);
        assert!(settings.timestamp_enabled);
        assert!(settings.timestamp_shuffle_enabled);

        let disabled = DeterministicSettings::from_mode_value(&json!({ "enabled": "yes" }));
        assert_eq!(disabled, DeterministicSettings::disabled());
        assert_eq!(
            DeterministicSettings::from_mode_value(&json!(true)),
            DeterministicSettings::disabled()
        );
    }

    #[test]
    fn shuffle_is_a_permutation_of_each_window() {
        let mut seen: Vec<i64> = (0..1000).map(shuffled_timestamp_millis).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..1000).collect::<Vec<_>>());
        assert_eq!(shuffled_timestamp_millis(1000) / 1000, 1);
    }
}
