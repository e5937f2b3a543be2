//! Microphone usage probe: "is any application capturing right now?"
//!
//! The OS keeps one usage record per consuming application (and per
//! sub-identity for packaged apps) with the last start and stop times of
//! microphone access. A record whose start is later than its stop is read as
//! still open. This is a timestamp-ordering heuristic, not an OS flag: clock
//! skew can fool it, and equal timestamps count as closed.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Last start/stop of microphone access for one consumer (FILETIME ticks on
/// Windows; any monotonic unit works).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageInterval {
    pub start: u64,
    pub stop: u64,
}

impl UsageInterval {
    /// Open iff the recorded start is strictly later than the recorded stop.
    pub fn is_open(&self) -> bool {
        self.start > self.stop
    }
}

/// One node of the usage-record tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<UsageInterval>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<UsageEntry>,
}

impl UsageEntry {
    pub fn leaf(name: impl Into<String>, start: u64, stop: u64) -> Self {
        Self {
            name: name.into(),
            interval: Some(UsageInterval { start, stop }),
            children: Vec::new(),
        }
    }

    pub fn group(name: impl Into<String>, children: Vec<UsageEntry>) -> Self {
        Self {
            name: name.into(),
            interval: None,
            children,
        }
    }

    fn is_open_here(&self) -> bool {
        self.interval.is_some_and(|i| i.is_open())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageStatus {
    InUse,
    NotInUse,
}

impl UsageStatus {
    pub fn is_in_use(self) -> bool {
        self == UsageStatus::InUse
    }
}

impl std::fmt::Display for UsageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UsageStatus::InUse => write!(f, "in use"),
            UsageStatus::NotInUse => write!(f, "not in use"),
        }
    }
}

/// Read-only source of usage records.
pub trait UsageStore {
    /// Top-level entries, or `None` when the store itself is absent.
    fn entries(&self) -> Option<Vec<UsageEntry>>;
}

impl<T: UsageStore + ?Sized> UsageStore for Box<T> {
    fn entries(&self) -> Option<Vec<UsageEntry>> {
        (**self).entries()
    }
}

/// Point-in-time usage query over a [`UsageStore`].
pub struct UsageProbe<S: UsageStore> {
    store: S,
}

impl<S: UsageStore> UsageProbe<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// `InUse` as soon as one open interval exists anywhere in the tree.
    pub fn probe(&self) -> UsageStatus {
        match self.store.entries() {
            Some(entries) if any_open(&entries) => UsageStatus::InUse,
            _ => UsageStatus::NotInUse,
        }
    }

    /// Paths (`parent/child`) of every consumer with an open interval.
    pub fn active_consumers(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(entries) = self.store.entries() {
            collect_open(&entries, "", &mut out);
        }
        out
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

fn any_open(entries: &[UsageEntry]) -> bool {
    entries
        .iter()
        .any(|e| e.is_open_here() || any_open(&e.children))
}

fn collect_open(entries: &[UsageEntry], prefix: &str, out: &mut Vec<String>) {
    for e in entries {
        let path = if prefix.is_empty() {
            e.name.clone()
        } else {
            format!("{prefix}/{}", e.name)
        };
        if e.is_open_here() {
            out.push(path.clone());
        }
        collect_open(&e.children, &path, out);
    }
}

// ── JSON snapshot store ──

/// Usage records read from a JSON file (an array of [`UsageEntry`]).
///
/// A missing file is an absent store; an unreadable or malformed one is
/// logged and treated the same way.
#[derive(Debug, Clone)]
pub struct JsonUsageStore {
    path: PathBuf,
}

impl JsonUsageStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl UsageStore for JsonUsageStore {
    fn entries(&self) -> Option<Vec<UsageEntry>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("usage snapshot unreadable ({}): {e}", self.path.display());
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(entries) => Some(entries),
            Err(e) => {
                log::warn!("usage snapshot malformed ({}): {e}", self.path.display());
                None
            }
        }
    }
}

/// A store that never has records (platforms without a consent store).
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyUsageStore;

impl UsageStore for EmptyUsageStore {
    fn entries(&self) -> Option<Vec<UsageEntry>> {
        None
    }
}

// ── Windows consent store ──

#[cfg(windows)]
mod registry {
    use super::*;
    use winreg::RegKey;
    use winreg::enums::{HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE};

    const CONSENT_STORE: &str =
        r"SOFTWARE\Microsoft\Windows\CurrentVersion\CapabilityAccessManager\ConsentStore\microphone";
    const LAST_USED_START: &str = "LastUsedTimeStart";
    const LAST_USED_STOP: &str = "LastUsedTimeStop";

    /// Top level plus one sub-identity level (e.g. `NonPackaged\<exe>`).
    const MAX_DEPTH: usize = 2;

    /// Usage records from the capability access manager consent store,
    /// merged from the per-user and machine-wide hives.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct RegistryUsageStore;

    impl RegistryUsageStore {
        pub fn new() -> Self {
            Self
        }
    }

    fn read_entry(key: &RegKey, name: String, depth: usize) -> UsageEntry {
        let interval = match (
            key.get_value::<u64, _>(LAST_USED_START),
            key.get_value::<u64, _>(LAST_USED_STOP),
        ) {
            (Ok(start), Ok(stop)) => Some(UsageInterval { start, stop }),
            _ => None,
        };
        let mut children = Vec::new();
        if depth < MAX_DEPTH {
            for sub in key.enum_keys().flatten() {
                if let Ok(child) = key.open_subkey(&sub) {
                    children.push(read_entry(&child, sub, depth + 1));
                }
            }
        }
        UsageEntry {
            name,
            interval,
            children,
        }
    }

    impl UsageStore for RegistryUsageStore {
        fn entries(&self) -> Option<Vec<UsageEntry>> {
            let mut found = false;
            let mut entries = Vec::new();
            for hive in [HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE] {
                let Ok(root) = RegKey::predef(hive).open_subkey(CONSENT_STORE) else {
                    continue;
                };
                found = true;
                for name in root.enum_keys().flatten() {
                    if let Ok(key) = root.open_subkey(&name) {
                        entries.push(read_entry(&key, name, 1));
                    }
                }
            }
            found.then_some(entries)
        }
    }
}

#[cfg(windows)]
pub use registry::RegistryUsageStore;

/// The usage store for the current platform.
pub fn platform_store() -> Box<dyn UsageStore + Send> {
    #[cfg(windows)]
    {
        Box::new(RegistryUsageStore::new())
    }
    #[cfg(not(windows))]
    {
        Box::new(EmptyUsageStore)
    }
}

// ── Test stub ──

/// Mutable in-memory store for tests.
pub mod stub {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    pub struct StubUsageStore {
        entries: Arc<Mutex<Option<Vec<UsageEntry>>>>,
    }

    impl StubUsageStore {
        pub fn new(entries: Option<Vec<UsageEntry>>) -> Self {
            Self {
                entries: Arc::new(Mutex::new(entries)),
            }
        }

        /// A store with one consumer currently capturing.
        pub fn in_use() -> Self {
            Self::new(Some(vec![UsageEntry::leaf("recorder.exe", 30, 25)]))
        }

        /// A store whose only consumer has stopped.
        pub fn idle() -> Self {
            Self::new(Some(vec![UsageEntry::leaf("recorder.exe", 10, 20)]))
        }

        pub fn set_entries(&self, entries: Option<Vec<UsageEntry>>) {
            if let Ok(mut e) = self.entries.lock() {
                *e = entries;
            }
        }

        /// Flip between the [`in_use`](Self::in_use) and [`idle`](Self::idle) record sets.
        pub fn set_in_use(&self, in_use: bool) {
            let entry = if in_use {
                UsageEntry::leaf("recorder.exe", 30, 25)
            } else {
                UsageEntry::leaf("recorder.exe", 10, 20)
            };
            self.set_entries(Some(vec![entry]));
        }
    }

    impl UsageStore for StubUsageStore {
        fn entries(&self) -> Option<Vec<UsageEntry>> {
            self.entries.lock().ok().and_then(|e| e.clone())
        }
    }
}
