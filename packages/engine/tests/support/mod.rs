#![allow(dead_code)]

pub mod simulation_test;
pub mod simulations;

use std::sync::Once;

use serde_json::{json, Value as JsonValue};

/// Installs a `RUST_LOG`-driven subscriber once per test binary.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// `{id, value}` entities keyed by `/id`.
pub fn line_schema() -> JsonValue {
    json!({
        "x-lix-key": "test_line",
        "x-lix-version": "1.0",
        "x-lix-primary-key": ["/id"],
        "type": "object",
        "properties": {
            "id": { "type": "string" },
            "value": { "type": "string" }
        },
        "required": ["id", "value"],
        "additionalProperties": false
    })
}

#[macro_export]
macro_rules! simulation_test {
    ($name:ident, |$sim:ident| $body:expr) => {
        paste::paste! {
            #[test]
            fn [<$name _base>]() {
                $crate::support::simulation_test::run_simulation_test(
                    "base",
                    concat!(module_path!(), "::", stringify!($name)),
                    |$sim| $body,
                );
            }

            #[test]
            fn [<$name _materialization>]() {
                $crate::support::simulation_test::run_simulation_test(
                    "materialization",
                    concat!(module_path!(), "::", stringify!($name)),
                    |$sim| $body,
                );
            }

            #[test]
            fn [<$name _timestamp_shuffle>]() {
                $crate::support::simulation_test::run_simulation_test(
                    "timestamp_shuffle",
                    concat!(module_path!(), "::", stringify!($name)),
                    |$sim| $body,
                );
            }
        }
    };
}
