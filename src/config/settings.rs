use serde::{Deserialize, Serialize};

/// CLI settings read from `~/.config/gym-score/config.yaml`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,

    /// Force colors on or off; unset means "when stdout is a terminal"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<bool>,

    /// Decimal places in table output
    pub precision: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            color: None,
            precision: 3,
        }
    }
}
