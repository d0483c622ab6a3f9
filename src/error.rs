//! Unified error type for configuration loading and setup failures.
//!
//! `SentinelError` is the single error type returned on the composition
//! path (config parsing, packet-source binding, action registration). It
//! serializes as `{ "kind": "...", "message": "..." }`, useful for the
//! CLI's `--format json` diagnostics. The packet hot path never returns an
//! error — malformed packets are dropped silently; see
//! `packet::dissect_ethernet` and `flow::FlowCache`.

use serde::ser::SerializeStruct;

/// Top-level error type for the sensor/reactor engine.
#[derive(Debug, thiserror::Error)]
pub enum SentinelError {
    /// The configuration tree could not be parsed or failed validation.
    #[error("{0}")]
    Config(String),

    /// The packet source could not be bound (kernel queue, interface, etc.).
    #[error("{0}")]
    Source(String),

    /// An action or trigger referenced an invalid configuration value.
    #[error("{0}")]
    Action(String),

    /// I/O failure reading a config file or replay capture.
    #[error("{0}")]
    Io(String),
}

impl SentinelError {
    /// Returns the error kind as a string matching the variant name.
    pub fn kind(&self) -> &'static str {
        match self {
            SentinelError::Config(_) => "Config",
            SentinelError::Source(_) => "Source",
            SentinelError::Action(_) => "Action",
            SentinelError::Io(_) => "Io",
        }
    }
}

/// Custom Serialize: produces `{ "kind": "Variant", "message": "..." }`.
impl serde::Serialize for SentinelError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut s = serializer.serialize_struct("SentinelError", 2)?;
        s.serialize_field("kind", self.kind())?;
        s.serialize_field("message", &self.to_string())?;
        s.end()
    }
}

impl From<std::io::Error> for SentinelError {
    fn from(err: std::io::Error) -> Self {
        SentinelError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for SentinelError {
    fn from(err: toml::de::Error) -> Self {
        SentinelError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_returns_correct_variant_name() {
        assert_eq!(SentinelError::Config("bad".into()).kind(), "Config");
        assert_eq!(SentinelError::Source("bad".into()).kind(), "Source");
        assert_eq!(SentinelError::Action("bad".into()).kind(), "Action");
        assert_eq!(SentinelError::Io("bad".into()).kind(), "Io");
    }

    #[test]
    fn test_error_display_shows_message() {
        let err = SentinelError::Config("missing expiry".into());
        assert_eq!(err.to_string(), "missing expiry");
    }

    #[test]
    fn test_error_serializes_as_kind_and_message() {
        let err = SentinelError::Source("bind failed".into());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "Source");
        assert_eq!(json["message"], "bind failed");
    }

    #[test]
    fn test_from_io_error_produces_io_variant() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: SentinelError = io_err.into();
        assert_eq!(err.kind(), "Io");
        assert!(err.to_string().contains("file missing"));
    }

    #[test]
    fn test_all_variants_serialize_with_two_fields() {
        let variants: Vec<SentinelError> = vec![
            SentinelError::Config("a".into()),
            SentinelError::Source("b".into()),
            SentinelError::Action("c".into()),
            SentinelError::Io("d".into()),
        ];
        for err in variants {
            let json = serde_json::to_value(&err).unwrap();
            let obj = json.as_object().unwrap();
            assert_eq!(obj.len(), 2, "Expected exactly 2 fields for {err:?}");
            assert!(obj.contains_key("kind"));
            assert!(obj.contains_key("message"));
        }
    }
}
