//! Peripheral lighting: SDK seam, patterns and colours.
//!
//! The reconciliation loop owns at most one [`LightingConnection`] at a time
//! and only ever talks to it through these traits. Connecting and pushing are
//! blocking calls, so a result is always observed before the peripheral mode
//! moves.

pub mod chroma;
pub mod color;
pub mod pattern;

use std::fmt;

pub use color::{Rgb, format_color, parse_color};
pub use pattern::{LightingPattern, PatternSet};

use crate::config::Config;

#[derive(Debug)]
pub enum LightingError {
    /// Could not open a session with the lighting service.
    Connect(String),
    /// A pattern push failed.
    Send(String),
    /// The service answered with something unexpected.
    Protocol(String),
}

impl fmt::Display for LightingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LightingError::Connect(e) => write!(f, "Lighting connect failed: {e}"),
            LightingError::Send(e) => write!(f, "Lighting update failed: {e}"),
            LightingError::Protocol(e) => write!(f, "Lighting protocol error: {e}"),
        }
    }
}

impl std::error::Error for LightingError {}

pub type Result<T> = std::result::Result<T, LightingError>;

/// One live session with a lighting peripheral.
///
/// Implementations release their session on drop if `uninitialize` was
/// never called.
pub trait LightingConnection {
    fn is_initialized(&self) -> bool;

    fn set_pattern(&mut self, pattern: &LightingPattern) -> Result<()>;

    /// Close the session. Calling it twice is harmless.
    fn uninitialize(&mut self);
}

/// Factory for lighting sessions.
pub trait LightingSdk {
    fn create_connection(&self) -> Result<Box<dyn LightingConnection>>;
}

impl<T: LightingSdk + ?Sized> LightingSdk for Box<T> {
    fn create_connection(&self) -> Result<Box<dyn LightingConnection>> {
        (**self).create_connection()
    }
}

/// Lighting disabled: sessions always open and swallow every pattern.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLighting;

struct NullConnection {
    initialized: bool,
}

impl LightingConnection for NullConnection {
    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn set_pattern(&mut self, _pattern: &LightingPattern) -> Result<()> {
        Ok(())
    }

    fn uninitialize(&mut self) {
        self.initialized = false;
    }
}

impl LightingSdk for NullLighting {
    fn create_connection(&self) -> Result<Box<dyn LightingConnection>> {
        Ok(Box::new(NullConnection { initialized: true }))
    }
}

/// The SDK selected by `config`: Chroma REST, or [`NullLighting`] when
/// lighting is switched off.
pub fn sdk_from_config(config: &Config) -> Box<dyn LightingSdk> {
    if config.lighting_enabled {
        Box::new(chroma::ChromaRestSdk::new(&config.chroma_url))
    } else {
        log::info!("peripheral lighting disabled");
        Box::new(NullLighting)
    }
}

/// Pattern pair built from the configured colours.
///
/// Colours that fail to parse fall back to red/green; `Config::validate`
/// reports them separately.
pub fn patterns_from_config(config: &Config) -> PatternSet {
    let muted = parse_color(&config.muted_color).unwrap_or(Rgb::RED);
    let unmuted = parse_color(&config.unmuted_color).unwrap_or(Rgb::GREEN);
    PatternSet::new(muted, unmuted, config.accent_key_enabled)
}

// ── Test stub ──

/// Recording lighting SDK for tests.
pub mod stub {
    use super::*;
    use std::sync::{Arc, Mutex, MutexGuard};

    #[derive(Default)]
    struct StubState {
        fail_connect: bool,
        fail_send: bool,
        uninitialized_on_connect: bool,
        connects: usize,
        uninitializes: usize,
        live: usize,
        pushed: Vec<LightingPattern>,
    }

    #[derive(Clone, Default)]
    pub struct StubLighting {
        state: Arc<Mutex<StubState>>,
    }

    impl StubLighting {
        pub fn new() -> Self {
            Self::default()
        }

        fn lock(&self) -> MutexGuard<'_, StubState> {
            self.state.lock().unwrap_or_else(|e| e.into_inner())
        }

        /// Make `create_connection` fail.
        pub fn set_fail_connect(&self, fail: bool) {
            self.lock().fail_connect = fail;
        }

        /// Make `set_pattern` fail on every live connection.
        pub fn set_fail_send(&self, fail: bool) {
            self.lock().fail_send = fail;
        }

        /// Hand out connections that report `is_initialized() == false`.
        pub fn set_uninitialized_on_connect(&self, on: bool) {
            self.lock().uninitialized_on_connect = on;
        }

        pub fn connects(&self) -> usize {
            self.lock().connects
        }

        pub fn uninitializes(&self) -> usize {
            self.lock().uninitializes
        }

        /// Connections created and not yet uninitialized.
        pub fn live_connections(&self) -> usize {
            self.lock().live
        }

        pub fn pushed(&self) -> Vec<LightingPattern> {
            self.lock().pushed.clone()
        }

        pub fn last_pattern(&self) -> Option<LightingPattern> {
            self.lock().pushed.last().cloned()
        }
    }

    struct StubConnection {
        sdk: StubLighting,
        initialized: bool,
    }

    impl LightingConnection for StubConnection {
        fn is_initialized(&self) -> bool {
            self.initialized
        }

        fn set_pattern(&mut self, pattern: &LightingPattern) -> Result<()> {
            let mut s = self.sdk.lock();
            if s.fail_send {
                return Err(LightingError::Send("stub send failure".into()));
            }
            s.pushed.push(pattern.clone());
            Ok(())
        }

        fn uninitialize(&mut self) {
            if self.initialized {
                self.initialized = false;
                let mut s = self.sdk.lock();
                s.uninitializes += 1;
                s.live = s.live.saturating_sub(1);
            }
        }
    }

    impl Drop for StubConnection {
        fn drop(&mut self) {
            self.uninitialize();
        }
    }

    impl LightingSdk for StubLighting {
        fn create_connection(&self) -> Result<Box<dyn LightingConnection>> {
            let mut s = self.lock();
            if s.fail_connect {
                return Err(LightingError::Connect("stub connect failure".into()));
            }
            s.connects += 1;
            let initialized = !s.uninitialized_on_connect;
            if initialized {
                s.live += 1;
            }
            Ok(Box::new(StubConnection {
                sdk: self.clone(),
                initialized,
            }))
        }
    }
}
