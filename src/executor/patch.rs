//! Partial updates of the general settings.

use serde::{Deserialize, Deserializer};

use crate::observability::LogLevel;
use crate::tunnel::Mode;

/// A field of a partial update.
///
/// Distinguishes a field left out of the body from one sent as `null` and
/// from one carrying a value (including zero values such as `0` or `false`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Patch<T> {
    #[default]
    Absent,
    Null,
    Value(T),
}

impl<T> Patch<T> {
    /// The new value, if one was sent. `null` leaves the field unchanged.
    pub fn value(self) -> Option<T> {
        match self {
            Patch::Value(v) => Some(v),
            Patch::Absent | Patch::Null => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Patch::Absent)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Only reached when the key is present; absent keys use `Default`.
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(v) => Patch::Value(v),
            None => Patch::Null,
        })
    }
}

/// Body of `PATCH /configs`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct GeneralPatch {
    pub port: Patch<u16>,
    pub socks_port: Patch<u16>,
    pub redir_port: Patch<u16>,
    pub redir_bind_address: Patch<String>,
    pub allow_lan: Patch<bool>,
    pub bind_address: Patch<String>,
    pub mode: Patch<Mode>,
    pub log_level: Patch<LogLevel>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_null_and_zero_are_distinct() {
        let patch: GeneralPatch = serde_json::from_str(r#"{"port": 0, "socks-port": null}"#).unwrap();
        assert_eq!(patch.port, Patch::Value(0));
        assert_eq!(patch.socks_port, Patch::Null);
        assert!(patch.redir_port.is_absent());
        assert!(patch.allow_lan.is_absent());
    }

    #[test]
    fn enum_fields_use_wire_names() {
        let patch: GeneralPatch =
            serde_json::from_str(r#"{"mode": "global", "log-level": "warning", "allow-lan": false}"#).unwrap();
        assert_eq!(patch.mode, Patch::Value(Mode::Global));
        assert_eq!(patch.log_level, Patch::Value(LogLevel::Warning));
        assert_eq!(patch.allow_lan, Patch::Value(false));
    }

    #[test]
    fn wrong_type_is_rejected() {
        assert!(serde_json::from_str::<GeneralPatch>(r#"{"port": "7890"}"#).is_err());
        assert!(serde_json::from_str::<GeneralPatch>(r#"{"mode": "sideways"}"#).is_err());
    }
}
