//! Tracing initialisation for the command-line tool.
//!
//! Logs go to stderr so that JSON printed on stdout stays machine-readable.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Global default level: "trace" | "debug" | "info" | "warn" | "error"
    #[serde(default = "default_level")]
    pub level: String,
    /// Per-crate overrides, eg `chainledger-sync` → `debug`
    #[serde(default)]
    pub components: BTreeMap<String, String>,
    /// JSON lines instead of human-readable text
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            components: BTreeMap::new(),
            json: false,
        }
    }
}

impl LogConfig {
    /// Parse `component=level` overrides, ignoring malformed ones.
    pub fn with_overrides<'a>(mut self, overrides: impl IntoIterator<Item = &'a String>) -> Self {
        for raw in overrides {
            match raw.split_once('=') {
                Some((component, level)) if !component.is_empty() && !level.is_empty() => {
                    self.components.insert(component.to_string(), level.to_string());
                }
                _ => eprintln!("ignoring log override {raw:?}, expected component=level"),
            }
        }
        self
    }

    /// EnvFilter directives: "info,chainledger_sync=debug".
    pub fn directives(&self) -> String {
        let mut directives = self.level.clone();
        for (component, level) in &self.components {
            directives.push_str(&format!(",{}={}", component.replace('-', "_"), level));
        }
        directives
    }
}

/// Install the global subscriber. Call once at startup.
pub fn init_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_new(config.directives()).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_include_overrides() {
        let overrides = vec![
            "chainledger-sync=debug".to_string(),
            "bogus".to_string(),
            "chainledger-evm=trace".to_string(),
        ];
        let config = LogConfig {
            level: "warn".into(),
            ..Default::default()
        }
        .with_overrides(&overrides);
        assert_eq!(
            config.directives(),
            "warn,chainledger_evm=trace,chainledger_sync=debug"
        );
    }
}
