//! Authentication plugin selection

use crate::protocol::constants::plugins;
use crate::{Error, Result};
use serde::Deserialize;

/// Authentication plugin requested in `op_connect`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum AuthPlugin {
    /// Secure remote password with SHA-1 proof (server default)
    #[default]
    #[serde(rename = "Srp")]
    Srp,
    /// Secure remote password with SHA-256 proof
    #[serde(rename = "Srp256")]
    Srp256,
    /// Pre-3.0 password hashing
    #[serde(rename = "Legacy_Auth")]
    LegacyAuth,
}

impl AuthPlugin {
    /// Plugin name as sent on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Self::Srp => plugins::SRP,
            Self::Srp256 => plugins::SRP256,
            Self::LegacyAuth => plugins::LEGACY_AUTH,
        }
    }
}

impl std::fmt::Display for AuthPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for AuthPlugin {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            plugins::SRP => Ok(Self::Srp),
            plugins::SRP256 => Ok(Self::Srp256),
            plugins::LEGACY_AUTH => Ok(Self::LegacyAuth),
            _ => Err(Error::Config(format!(
                "invalid auth_plugin_name '{}': expected Srp, Srp256, or Legacy_Auth",
                s
            ))),
        }
    }
}

/// Parse a boolean option the way connection strings spell them
pub(crate) fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        _ => Err(Error::Config(format!(
            "invalid {} '{}': expected a boolean",
            name, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_round_trips_through_name() {
        for plugin in [AuthPlugin::Srp, AuthPlugin::Srp256, AuthPlugin::LegacyAuth] {
            assert_eq!(plugin.name().parse::<AuthPlugin>().unwrap(), plugin);
        }
    }

    #[test]
    fn test_unknown_plugin_rejected() {
        assert!(matches!("Win_Sspi".parse::<AuthPlugin>(), Err(Error::Config(_))));
    }

    #[test]
    fn test_parse_bool_spellings() {
        assert!(parse_bool("wire_crypt", "True").unwrap());
        assert!(parse_bool("wire_crypt", "1").unwrap());
        assert!(!parse_bool("wire_crypt", "F").unwrap());
        assert!(parse_bool("wire_crypt", "yes").is_err());
    }
}
