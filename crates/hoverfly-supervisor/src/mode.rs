// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Operating modes of the engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::config::ConfigError;

/// Engine operating mode.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoverflyMode {
    /// Serve responses from the loaded simulation.
    #[default]
    Simulate,
    /// Serve matching simulations, pass everything else through.
    Spy,
    /// Record real traffic into a simulation.
    Capture,
    /// Compare real responses against the simulation.
    Diff,
}

impl HoverflyMode {
    /// Lowercase name used by the admin API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simulate => "simulate",
            Self::Spy => "spy",
            Self::Capture => "capture",
            Self::Diff => "diff",
        }
    }

    /// Command-line flag that starts the engine in this mode.
    ///
    /// Simulate is the engine default and has no flag.
    pub fn command_flag(&self) -> Option<&'static str> {
        match self {
            Self::Simulate => None,
            Self::Spy => Some("-spy"),
            Self::Capture => Some("-capture"),
            Self::Diff => Some("-diff"),
        }
    }

    /// Read the mode from `HOVERFLY_MODE`, defaulting to simulate.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var("HOVERFLY_MODE") {
            Ok(value) => value.parse(),
            Err(_) => Ok(Self::default()),
        }
    }
}

impl fmt::Display for HoverflyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HoverflyMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulate" => Ok(Self::Simulate),
            "spy" => Ok(Self::Spy),
            "capture" => Ok(Self::Capture),
            "diff" => Ok(Self::Diff),
            _ => Err(ConfigError::InvalidMode(s.to_string())),
        }
    }
}

/// Extra arguments sent along with a mode change.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeArguments {
    /// Request headers to keep when capturing. `["*"]` keeps all of them.
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub headers_whitelist: Vec<String>,
    /// Record request sequences so repeated calls replay in order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub stateful: bool,
}

impl ModeArguments {
    /// Create mode arguments.
    pub fn new(headers_whitelist: Vec<String>, stateful: bool) -> Self {
        Self {
            headers_whitelist,
            stateful,
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Mode as reported or accepted by the admin API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeView {
    /// Current mode.
    pub mode: HoverflyMode,
    /// Arguments for the mode, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<ModeArguments>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_default_is_simulate() {
        assert_eq!(HoverflyMode::default(), HoverflyMode::Simulate);
    }

    #[test]
    fn test_mode_from_str_is_case_insensitive() {
        assert_eq!("CAPTURE".parse::<HoverflyMode>().unwrap(), HoverflyMode::Capture);
        assert_eq!(" spy ".parse::<HoverflyMode>().unwrap(), HoverflyMode::Spy);
        assert!("modify".parse::<HoverflyMode>().is_err());
    }

    #[test]
    fn test_command_flags() {
        assert_eq!(HoverflyMode::Simulate.command_flag(), None);
        assert_eq!(HoverflyMode::Spy.command_flag(), Some("-spy"));
        assert_eq!(HoverflyMode::Capture.command_flag(), Some("-capture"));
        assert_eq!(HoverflyMode::Diff.command_flag(), Some("-diff"));
    }

    #[test]
    fn test_mode_view_wire_format() {
        let view = ModeView {
            mode: HoverflyMode::Capture,
            arguments: Some(ModeArguments::new(vec!["Authorization".to_string()], true)),
        };

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "mode": "capture",
                "arguments": {"headersWhitelist": ["Authorization"], "stateful": true}
            })
        );
    }

    #[test]
    fn test_mode_view_without_arguments() {
        let view: ModeView = serde_json::from_str(r#"{"mode":"diff"}"#).unwrap();
        assert_eq!(view.mode, HoverflyMode::Diff);
        assert!(view.arguments.is_none());
    }

    #[test]
    fn test_mode_view_with_null_arguments_fields() {
        let view: ModeView = serde_json::from_str(
            r#"{"mode":"simulate","arguments":{"headersWhitelist":null,"matchingStrategy":"strongest"}}"#,
        )
        .unwrap();
        assert_eq!(view.arguments, Some(ModeArguments::default()));
    }
}
