//! Unified error type for the micmute-lib crate.
//!
//! [`MicmuteError`] wraps module-specific errors (`AudioError`,
//! `LightingError`, `HotkeyError`) and domain-specific error kinds
//! (`Config`, `Color`). `From` impls allow `?` to propagate across module
//! boundaries seamlessly.

use std::fmt;

use crate::audio::AudioError;
use crate::hotkey::HotkeyError;
use crate::lighting::LightingError;

/// Unified error type for micmute-lib operations.
#[derive(Debug)]
pub enum MicmuteError {
    /// Audio subsystem error (backend init, mute toggle, subscriptions).
    Audio(AudioError),
    /// Peripheral lighting SDK error (connect, pattern push).
    Lighting(LightingError),
    /// Hotkey binding error (conflict, invalid combination).
    Hotkey(HotkeyError),
    /// Standard I/O error (config persistence, usage snapshot files).
    Io(std::io::Error),
    /// Configuration validation error.
    Config(String),
    /// Color parsing error.
    Color(String),
}

impl fmt::Display for MicmuteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MicmuteError::Audio(e) => write!(f, "{e}"),
            MicmuteError::Lighting(e) => write!(f, "{e}"),
            MicmuteError::Hotkey(e) => write!(f, "{e}"),
            MicmuteError::Io(e) => write!(f, "I/O error: {e}"),
            MicmuteError::Config(e) => write!(f, "Config error: {e}"),
            MicmuteError::Color(e) => write!(f, "Color error: {e}"),
        }
    }
}

impl std::error::Error for MicmuteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MicmuteError::Audio(e) => Some(e),
            MicmuteError::Lighting(e) => Some(e),
            MicmuteError::Hotkey(e) => Some(e),
            MicmuteError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<AudioError> for MicmuteError {
    fn from(e: AudioError) -> Self {
        MicmuteError::Audio(e)
    }
}

impl From<LightingError> for MicmuteError {
    fn from(e: LightingError) -> Self {
        MicmuteError::Lighting(e)
    }
}

impl From<HotkeyError> for MicmuteError {
    fn from(e: HotkeyError) -> Self {
        MicmuteError::Hotkey(e)
    }
}

impl From<std::io::Error> for MicmuteError {
    fn from(e: std::io::Error) -> Self {
        MicmuteError::Io(e)
    }
}

/// Crate-level Result alias using [`MicmuteError`].
pub type Result<T> = std::result::Result<T, MicmuteError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::KeyCombo;

    #[test]
    fn from_audio_error() {
        let e: MicmuteError = AudioError::InitFailed("test".into()).into();
        assert!(matches!(e, MicmuteError::Audio(AudioError::InitFailed(_))));
    }

    #[test]
    fn from_lighting_error() {
        let e: MicmuteError = LightingError::Connect("refused".into()).into();
        assert!(matches!(
            e,
            MicmuteError::Lighting(LightingError::Connect(_))
        ));
    }

    #[test]
    fn from_hotkey_error() {
        let e: MicmuteError = HotkeyError::AlreadyBound(KeyCombo::new("Ctrl+M")).into();
        assert!(matches!(e, MicmuteError::Hotkey(HotkeyError::AlreadyBound(_))));
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let e: MicmuteError = io_err.into();
        assert!(matches!(e, MicmuteError::Io(_)));
    }

    #[test]
    fn display_config_error() {
        let e = MicmuteError::Config("invalid input".into());
        assert_eq!(e.to_string(), "Config error: invalid input");
    }

    #[test]
    fn display_color_error() {
        let e = MicmuteError::Color("bad hex".into());
        assert_eq!(e.to_string(), "Color error: bad hex");
    }

    #[test]
    fn display_hotkey_conflict() {
        let e = MicmuteError::Hotkey(HotkeyError::AlreadyBound(KeyCombo::new("Ctrl+Shift+M")));
        assert_eq!(e.to_string(), "Hotkey already bound: Ctrl+Shift+M");
    }

    #[test]
    fn source_chains_audio_error() {
        let e = MicmuteError::Audio(AudioError::OperationFailed("SetMute".into()));
        let source = std::error::Error::source(&e).unwrap();
        assert!(source.to_string().contains("SetMute"));
    }

    #[test]
    fn source_none_for_string_variants() {
        let e = MicmuteError::Config("test".into());
        assert!(std::error::Error::source(&e).is_none());
    }

    #[test]
    fn question_mark_propagation_audio_to_micmute() {
        fn inner() -> crate::audio::Result<()> {
            Err(AudioError::Unsupported)
        }
        fn outer() -> Result<()> {
            inner()?;
            Ok(())
        }
        let err = outer().unwrap_err();
        assert!(matches!(err, MicmuteError::Audio(AudioError::Unsupported)));
    }
}
