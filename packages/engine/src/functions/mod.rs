use chrono::SecondsFormat;

/// Source of identifiers and timestamps for every record the engine writes.
pub trait LixFunctionProvider {
    fn uuid_v7(&mut self) -> String;
    fn timestamp(&mut self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemFunctionProvider;

impl LixFunctionProvider for SystemFunctionProvider {
    fn uuid_v7(&mut self) -> String {
        uuid_v7()
    }

    fn timestamp(&mut self) -> String {
        timestamp()
    }
}

/// Wall-clock UUIDv7 in its hyphenated form.
pub(crate) fn uuid_v7() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// Current UTC time as RFC 3339 with millisecond precision.
pub(crate) fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::{LixFunctionProvider, SystemFunctionProvider};

    #[test]
    fn system_provider_generates_distinct_v7_ids() {
        let mut provider = SystemFunctionProvider;
        let first = provider.uuid_v7();
        let second = provider.uuid_v7();

        assert_ne!(first, second);
        let parsed = uuid::Uuid::parse_str(&first).expect("uuid should parse");
        assert_eq!(parsed.get_version_num(), 7);
    }

    #[test]
    fn system_timestamp_is_rfc3339_with_millis() {
        let mut provider = SystemFunctionProvider;
        let value = provider.timestamp();

        assert!(value.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&value).is_ok());
    }
}
