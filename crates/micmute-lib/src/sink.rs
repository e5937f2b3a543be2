//! Side-effect sinks driven by the reconciliation loop.
//!
//! The icon sink renders a [`PresentationState`] snapshot; re-rendering an
//! unchanged snapshot is just a redundant draw. The lighting sink owns the
//! single peripheral connection and reports push failures upward so the loop
//! can turn them into a peripheral-mode transition.

use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::lighting::{self, LightingConnection, LightingError, LightingSdk, PatternSet};
use crate::presentation::{DeviceStatus, PresentationState};

/// Tooltip text when there is no default capture device.
pub const NO_DEVICE_LABEL: &str = "< No device >";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IconKind {
    /// Device present and muted.
    Off,
    /// Device present and live.
    On,
    /// No device.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IconView {
    pub kind: IconKind,
    pub label: String,
}

impl IconView {
    pub fn from_state(state: &PresentationState) -> Self {
        match &state.device {
            DeviceStatus::Present { name, muted: true } => Self {
                kind: IconKind::Off,
                label: name.clone(),
            },
            DeviceStatus::Present { name, muted: false } => Self {
                kind: IconKind::On,
                label: name.clone(),
            },
            DeviceStatus::NoDevice => Self {
                kind: IconKind::Error,
                label: NO_DEVICE_LABEL.to_string(),
            },
        }
    }
}

/// Something that shows the status icon.
///
/// Implementations handle their own failures (log and carry on); a broken
/// icon must never stop reconciliation.
pub trait IconSink {
    fn render(&mut self, view: &IconView);
}

impl<T: IconSink + ?Sized> IconSink for Box<T> {
    fn render(&mut self, view: &IconView) {
        (**self).render(view)
    }
}

/// Icon sink that keeps every render, for tests and headless runs.
#[derive(Clone, Default)]
pub struct RecordingIconSink {
    renders: Arc<Mutex<Vec<IconView>>>,
}

impl RecordingIconSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn renders(&self) -> Vec<IconView> {
        self.renders.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<IconView> {
        self.renders.lock().ok().and_then(|r| r.last().cloned())
    }

    pub fn clear(&self) {
        if let Ok(mut r) = self.renders.lock() {
            r.clear();
        }
    }
}

impl IconSink for RecordingIconSink {
    fn render(&mut self, view: &IconView) {
        if let Ok(mut r) = self.renders.lock() {
            r.push(view.clone());
        }
    }
}

/// Owner of the peripheral connection and the two pre-built patterns.
pub struct LightingSink<L: LightingSdk> {
    sdk: L,
    patterns: PatternSet,
    connection: Option<Box<dyn LightingConnection>>,
}

impl<L: LightingSdk> LightingSink<L> {
    pub fn new(sdk: L, patterns: PatternSet) -> Self {
        Self {
            sdk,
            patterns,
            connection: None,
        }
    }

    /// Open a fresh connection, replacing any stale one.
    ///
    /// Blocks until the SDK answers; a connection that comes back
    /// uninitialized counts as a failure.
    pub fn connect(&mut self) -> lighting::Result<()> {
        self.teardown();
        let mut conn = self.sdk.create_connection()?;
        if !conn.is_initialized() {
            conn.uninitialize();
            return Err(LightingError::Connect(
                "connection reported not initialized".into(),
            ));
        }
        self.connection = Some(conn);
        Ok(())
    }

    /// Push the pattern for `muted`.
    pub fn push(&mut self, muted: bool) -> lighting::Result<()> {
        let conn = self
            .connection
            .as_mut()
            .ok_or_else(|| LightingError::Send("no active connection".into()))?;
        conn.set_pattern(self.patterns.for_muted(muted))
    }

    /// Uninitialize and drop the connection, if any.
    pub fn teardown(&mut self) {
        if let Some(mut conn) = self.connection.take() {
            conn.uninitialize();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(|c| c.is_initialized())
    }
}

impl<L: LightingSdk> Drop for LightingSink<L> {
    fn drop(&mut self) {
        self.teardown();
    }
}
