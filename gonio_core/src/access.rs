//! Read-only vs read-write signal selection.
//!
//! A signal's capability is an explicit flag chosen once at construction,
//! usually parsed from an `io` string next to the channel prefix.
use crate::error::GonioError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    ReadOnly,
    #[default]
    ReadWrite,
}

impl AccessMode {
    /// `i`/`input`/`ro` are read-only; `o`/`output`/`io`/`rw` are writable.
    pub fn from_io(io: &str) -> Result<Self, GonioError> {
        match io.trim().to_ascii_lowercase().as_str() {
            "i" | "input" | "ro" => Ok(Self::ReadOnly),
            "o" | "output" | "io" | "rw" => Ok(Self::ReadWrite),
            other => Err(GonioError::InvalidState(format!(
                "unknown io mode {other:?} (expected i, o, io, ro or rw)"
            ))),
        }
    }

    pub const fn is_writable(self) -> bool {
        matches!(self, Self::ReadWrite)
    }
}

/// Process-variable names behind one signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub read_pv: String,
    /// `None` for read-only signals.
    pub write_pv: Option<String>,
    pub access: AccessMode,
}

impl ChannelSpec {
    /// Readback is `prefix` + `_RBV`; the setpoint is `prefix` itself.
    pub fn from_prefix(prefix: &str, io: &str) -> Result<Self, GonioError> {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return Err(GonioError::InvalidState("empty channel prefix".into()));
        }
        let access = AccessMode::from_io(io)?;
        Ok(Self {
            read_pv: format!("{prefix}_RBV"),
            write_pv: access.is_writable().then(|| prefix.to_string()),
            access,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("i", AccessMode::ReadOnly)]
    #[case("input", AccessMode::ReadOnly)]
    #[case("RO", AccessMode::ReadOnly)]
    #[case("o", AccessMode::ReadWrite)]
    #[case("output", AccessMode::ReadWrite)]
    #[case("io", AccessMode::ReadWrite)]
    #[case(" rw ", AccessMode::ReadWrite)]
    fn parses_io_modes(#[case] io: &str, #[case] want: AccessMode) {
        assert_eq!(AccessMode::from_io(io).unwrap(), want);
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(matches!(
            AccessMode::from_io("x"),
            Err(GonioError::InvalidState(_))
        ));
    }

    #[test]
    fn read_only_spec_has_no_setpoint() {
        let spec = ChannelSpec::from_prefix("GON:X", "i").unwrap();
        assert_eq!(spec.read_pv, "GON:X_RBV");
        assert_eq!(spec.write_pv, None);

        let spec = ChannelSpec::from_prefix("GON:X", "io").unwrap();
        assert_eq!(spec.write_pv.as_deref(), Some("GON:X"));
    }
}
