//! Global hotkey → mute toggle.
//!
//! One binding at a time. Registration goes through a [`HotkeyRegistrar`],
//! which stands for the OS-wide hotkey table: a combination already taken
//! there (by this process or any other) is refused with
//! [`HotkeyError::AlreadyBound`]. The bound action never touches
//! presentation state; it asks the audio side to flip mute and the change
//! comes back as a normal device event.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::reconcile::{LoopControl, LoopHandle};

/// A key combination such as `Ctrl+Shift+M`.
///
/// [`KeyCombo::parse`] normalizes modifier names and order, so
/// `shift+control+m` and `Ctrl+Shift+M` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyCombo(String);

const MODIFIERS: [(&str, &[&str]); 4] = [
    ("Ctrl", &["ctrl", "control"]),
    ("Alt", &["alt", "option"]),
    ("Shift", &["shift"]),
    ("Super", &["super", "win", "cmd", "command", "meta"]),
];

fn modifier_index(token: &str) -> Option<usize> {
    let lower = token.to_ascii_lowercase();
    MODIFIERS
        .iter()
        .position(|(_, names)| names.contains(&lower.as_str()))
}

impl KeyCombo {
    /// Wrap a combination string as-is.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Validate and normalize a user-supplied combination.
    pub fn parse(s: &str) -> Result<Self, HotkeyError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(HotkeyError::InvalidCombo("empty key combination".into()));
        }
        let parts: Vec<&str> = s.split('+').map(str::trim).collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(HotkeyError::InvalidCombo(format!("malformed combination: {s}")));
        }
        let Some((key, mods)) = parts.split_last() else {
            return Err(HotkeyError::InvalidCombo(format!("malformed combination: {s}")));
        };
        if modifier_index(key).is_some() {
            return Err(HotkeyError::InvalidCombo(format!(
                "{s} has no key besides modifiers"
            )));
        }

        let mut seen = [false; MODIFIERS.len()];
        for m in mods {
            let idx = modifier_index(m)
                .ok_or_else(|| HotkeyError::InvalidCombo(format!("unknown modifier: {m}")))?;
            seen[idx] = true;
        }

        let mut out: Vec<String> = MODIFIERS
            .iter()
            .zip(seen)
            .filter(|(_, on)| *on)
            .map(|((name, _), _)| (*name).to_string())
            .collect();
        out.push(normalize_key(key));
        Ok(Self(out.join("+")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn normalize_key(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    ToggleMute,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotkeyBinding {
    pub combo: KeyCombo,
    pub action: HotkeyAction,
}

#[derive(Debug)]
pub enum HotkeyError {
    /// The combination is already registered, here or by another program.
    AlreadyBound(KeyCombo),
    InvalidCombo(String),
    /// The OS refused the registration for another reason.
    Registration(String),
}

impl fmt::Display for HotkeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HotkeyError::AlreadyBound(c) => write!(f, "Hotkey already bound: {c}"),
            HotkeyError::InvalidCombo(e) => write!(f, "Invalid hotkey: {e}"),
            HotkeyError::Registration(e) => write!(f, "Hotkey registration failed: {e}"),
        }
    }
}

impl std::error::Error for HotkeyError {}

/// OS-level hotkey table.
pub trait HotkeyRegistrar {
    /// Claim `combo`. Fails with `AlreadyBound` when it is taken.
    fn register(&mut self, combo: &KeyCombo) -> Result<(), HotkeyError>;

    fn unregister(&mut self, combo: &KeyCombo) -> Result<(), HotkeyError>;
}

/// In-memory hotkey table. Clones share the table, so two registrars made
/// from one table behave like two programs on the same desktop.
#[derive(Clone, Default)]
pub struct MemoryRegistrar {
    table: Arc<Mutex<HashSet<KeyCombo>>>,
}

impl MemoryRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_registered(&self, combo: &KeyCombo) -> bool {
        self.table.lock().map(|t| t.contains(combo)).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.table.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HotkeyRegistrar for MemoryRegistrar {
    fn register(&mut self, combo: &KeyCombo) -> Result<(), HotkeyError> {
        let mut table = self
            .table
            .lock()
            .map_err(|_| HotkeyError::Registration("hotkey table poisoned".into()))?;
        if !table.insert(combo.clone()) {
            return Err(HotkeyError::AlreadyBound(combo.clone()));
        }
        Ok(())
    }

    fn unregister(&mut self, combo: &KeyCombo) -> Result<(), HotkeyError> {
        let mut table = self
            .table
            .lock()
            .map_err(|_| HotkeyError::Registration("hotkey table poisoned".into()))?;
        table.remove(combo);
        Ok(())
    }
}

/// Whatever flips the microphone mute.
pub trait MuteToggle {
    /// Request a toggle; `false` if the request could not be delivered.
    fn toggle_mute(&self) -> bool;
}

impl MuteToggle for LoopControl {
    fn toggle_mute(&self) -> bool {
        LoopControl::toggle_mute(self)
    }
}

impl MuteToggle for LoopHandle {
    fn toggle_mute(&self) -> bool {
        LoopHandle::toggle_mute(self)
    }
}

/// Persisted hotkey value: one string, read at startup, written on bind,
/// removed on clear.
pub trait HotkeyStore {
    fn load(&self) -> Option<String>;

    fn store(&mut self, combo: &KeyCombo) -> crate::error::Result<()>;

    fn clear(&mut self) -> crate::error::Result<()>;
}

pub struct HotkeyToggleController<R: HotkeyRegistrar, T: MuteToggle> {
    registrar: R,
    toggle: T,
    binding: Option<HotkeyBinding>,
}

impl<R: HotkeyRegistrar, T: MuteToggle> HotkeyToggleController<R, T> {
    pub fn new(registrar: R, toggle: T) -> Self {
        Self {
            registrar,
            toggle,
            binding: None,
        }
    }

    /// Bind `combo` to `action`, replacing any previous binding.
    ///
    /// The new combination is claimed before the old one is released, so a
    /// refused bind leaves the previous binding working.
    pub fn bind(&mut self, combo: KeyCombo, action: HotkeyAction) -> Result<(), HotkeyError> {
        self.registrar.register(&combo)?;
        let new = HotkeyBinding { combo, action };
        log::info!("hotkey bound: {}", new.combo);
        if let Some(old) = self.binding.replace(new) {
            if let Err(e) = self.registrar.unregister(&old.combo) {
                log::warn!("could not release previous hotkey {}: {e}", old.combo);
            }
        }
        Ok(())
    }

    /// Release `combo` if it is the current binding. Returns whether
    /// anything was released.
    pub fn unbind(&mut self, combo: &KeyCombo) -> Result<bool, HotkeyError> {
        match &self.binding {
            Some(b) if &b.combo == combo => {}
            _ => return Ok(false),
        }
        self.registrar.unregister(combo)?;
        self.binding = None;
        log::info!("hotkey released: {combo}");
        Ok(true)
    }

    /// Release whatever is bound.
    pub fn clear(&mut self) -> Result<Option<KeyCombo>, HotkeyError> {
        let Some(combo) = self.binding.as_ref().map(|b| b.combo.clone()) else {
            return Ok(None);
        };
        self.unbind(&combo)?;
        Ok(Some(combo))
    }

    pub fn current(&self) -> Option<&HotkeyBinding> {
        self.binding.as_ref()
    }

    /// A registered combination was pressed. Runs its action when it is
    /// ours; returns whether anything ran.
    pub fn trigger(&self, combo: &KeyCombo) -> bool {
        match &self.binding {
            Some(b) if &b.combo == combo => match b.action {
                HotkeyAction::ToggleMute => self.toggle(),
            },
            _ => false,
        }
    }

    /// Ask for a mute flip. With no default device this is a silent no-op
    /// further down the line.
    pub fn toggle(&self) -> bool {
        self.toggle.toggle_mute()
    }

    /// Bind the persisted combination, if there is one.
    ///
    /// A stored value that no longer parses or registers is logged and left
    /// in place for the user to fix.
    pub fn restore(&mut self, store: &impl HotkeyStore) -> Option<KeyCombo> {
        let raw = store.load()?;
        let combo = match KeyCombo::parse(&raw) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("stored hotkey ignored: {e}");
                return None;
            }
        };
        match self.bind(combo.clone(), HotkeyAction::ToggleMute) {
            Ok(()) => Some(combo),
            Err(e) => {
                log::warn!("stored hotkey not registered: {e}");
                None
            }
        }
    }

    /// Bind and persist. Nothing is written when the bind is refused.
    ///
    /// Saving the combination that is already bound to the same action keeps
    /// the existing registration and only rewrites the stored value.
    pub fn bind_and_store(
        &mut self,
        combo: KeyCombo,
        store: &mut impl HotkeyStore,
    ) -> crate::error::Result<()> {
        let action = HotkeyAction::ToggleMute;
        let unchanged = self
            .binding
            .as_ref()
            .is_some_and(|b| b.combo == combo && b.action == action);
        if unchanged {
            log::debug!("hotkey {combo} already bound");
        } else {
            self.bind(combo.clone(), action)?;
        }
        store.store(&combo)
    }

    /// Release the binding and delete the persisted value.
    pub fn clear_and_store(&mut self, store: &mut impl HotkeyStore) -> crate::error::Result<()> {
        self.clear()?;
        store.clear()
    }

    pub fn registrar(&self) -> &R {
        &self.registrar
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    struct CountingToggle(Arc<AtomicUsize>);

    impl MuteToggle for CountingToggle {
        fn toggle_mute(&self) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[derive(Default)]
    struct MemoryStore(Option<String>);

    impl HotkeyStore for MemoryStore {
        fn load(&self) -> Option<String> {
            self.0.clone()
        }
        fn store(&mut self, combo: &KeyCombo) -> crate::error::Result<()> {
            self.0 = Some(combo.to_string());
            Ok(())
        }
        fn clear(&mut self) -> crate::error::Result<()> {
            self.0 = None;
            Ok(())
        }
    }

    fn combo(s: &str) -> KeyCombo {
        KeyCombo::parse(s).unwrap()
    }

    fn controller() -> (
        HotkeyToggleController<MemoryRegistrar, CountingToggle>,
        MemoryRegistrar,
        CountingToggle,
    ) {
        let reg = MemoryRegistrar::new();
        let toggle = CountingToggle::default();
        (
            HotkeyToggleController::new(reg.clone(), toggle.clone()),
            reg,
            toggle,
        )
    }

    // ── KeyCombo ──

    #[test]
    fn parse_normalizes_modifiers() {
        assert_eq!(combo("shift+control+m"), combo("Ctrl+Shift+M"));
        assert_eq!(combo(" ctrl + alt + f5 ").as_str(), "Ctrl+Alt+F5");
        assert_eq!(combo("win+space").as_str(), "Super+Space");
    }

    #[test]
    fn parse_key_only() {
        assert_eq!(combo("F9").as_str(), "F9");
    }

    #[test]
    fn parse_rejects_bad_input() {
        for bad in ["", "  ", "Ctrl+", "+M", "Ctrl+Shift", "Hyper+M", "Ctrl++M"] {
            assert!(
                matches!(KeyCombo::parse(bad), Err(HotkeyError::InvalidCombo(_))),
                "{bad:?} accepted"
            );
        }
    }

    // ── Controller ──

    #[test]
    fn bind_then_conflict_then_unbind_then_rebind() {
        let (mut c, _, _) = controller();
        let x = combo("Ctrl+Shift+M");
        c.bind(x.clone(), HotkeyAction::ToggleMute).unwrap();
        let err = c.bind(x.clone(), HotkeyAction::ToggleMute).unwrap_err();
        assert!(matches!(err, HotkeyError::AlreadyBound(ref k) if *k == x));

        assert!(c.unbind(&x).unwrap());
        c.bind(x.clone(), HotkeyAction::ToggleMute).unwrap();
        assert_eq!(c.current().unwrap().combo, x);
    }

    #[test]
    fn conflict_with_other_program() {
        let table = MemoryRegistrar::new();
        let mut other = table.clone();
        other.register(&combo("Ctrl+M")).unwrap();

        let mut c = HotkeyToggleController::new(table, CountingToggle::default());
        assert!(matches!(
            c.bind(combo("ctrl+m"), HotkeyAction::ToggleMute),
            Err(HotkeyError::AlreadyBound(_))
        ));
        assert!(c.current().is_none());
    }

    #[test]
    fn rebind_releases_old_combo() {
        let (mut c, reg, _) = controller();
        c.bind(combo("Ctrl+1"), HotkeyAction::ToggleMute).unwrap();
        c.bind(combo("Ctrl+2"), HotkeyAction::ToggleMute).unwrap();
        assert!(!reg.is_registered(&combo("Ctrl+1")));
        assert!(reg.is_registered(&combo("Ctrl+2")));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn refused_rebind_keeps_previous_binding() {
        let (mut c, reg, _) = controller();
        let mut other = reg.clone();
        other.register(&combo("Ctrl+2")).unwrap();

        c.bind(combo("Ctrl+1"), HotkeyAction::ToggleMute).unwrap();
        assert!(c.bind(combo("Ctrl+2"), HotkeyAction::ToggleMute).is_err());
        assert_eq!(c.current().unwrap().combo, combo("Ctrl+1"));
        assert!(reg.is_registered(&combo("Ctrl+1")));
    }

    #[test]
    fn unbind_other_combo_is_noop() {
        let (mut c, reg, _) = controller();
        c.bind(combo("Ctrl+1"), HotkeyAction::ToggleMute).unwrap();
        assert!(!c.unbind(&combo("Ctrl+2")).unwrap());
        assert!(reg.is_registered(&combo("Ctrl+1")));
    }

    #[test]
    fn trigger_runs_only_bound_combo() {
        let (mut c, _, toggle) = controller();
        c.bind(combo("Ctrl+Shift+M"), HotkeyAction::ToggleMute).unwrap();
        assert!(c.trigger(&combo("Ctrl+Shift+M")));
        assert!(!c.trigger(&combo("Ctrl+Shift+N")));
        assert_eq!(toggle.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn trigger_without_binding_does_nothing() {
        let (c, _, toggle) = controller();
        assert!(!c.trigger(&combo("Ctrl+M")));
        assert_eq!(toggle.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn clear_releases_everything() {
        let (mut c, reg, _) = controller();
        assert_eq!(c.clear().unwrap(), None);
        c.bind(combo("Alt+M"), HotkeyAction::ToggleMute).unwrap();
        assert_eq!(c.clear().unwrap(), Some(combo("Alt+M")));
        assert!(reg.is_empty());
    }

    // ── Persistence ──

    #[test]
    fn restore_binds_stored_value() {
        let (mut c, reg, _) = controller();
        let store = MemoryStore(Some("ctrl+shift+m".into()));
        assert_eq!(c.restore(&store), Some(combo("Ctrl+Shift+M")));
        assert!(reg.is_registered(&combo("Ctrl+Shift+M")));
    }

    #[test]
    fn restore_without_value_is_none() {
        let (mut c, _, _) = controller();
        assert_eq!(c.restore(&MemoryStore::default()), None);
    }

    #[test]
    fn restore_ignores_garbage() {
        let (mut c, reg, _) = controller();
        assert_eq!(c.restore(&MemoryStore(Some("Ctrl+".into()))), None);
        assert!(reg.is_empty());
    }

    #[test]
    fn bind_and_store_persists_only_on_success() {
        let (mut c, reg, _) = controller();
        let mut store = MemoryStore::default();
        c.bind_and_store(combo("Ctrl+1"), &mut store).unwrap();
        assert_eq!(store.0.as_deref(), Some("Ctrl+1"));

        let mut other = reg.clone();
        other.register(&combo("Ctrl+2")).unwrap();
        let err = c.bind_and_store(combo("Ctrl+2"), &mut store).unwrap_err();
        assert!(matches!(
            err,
            crate::error::MicmuteError::Hotkey(HotkeyError::AlreadyBound(_))
        ));
        assert_eq!(store.0.as_deref(), Some("Ctrl+1"));
    }

    #[test]
    fn storing_the_current_combo_again_succeeds() {
        let (mut c, reg, toggle) = controller();
        let mut store = MemoryStore::default();
        c.bind_and_store(combo("Ctrl+Shift+M"), &mut store).unwrap();
        c.bind_and_store(combo("shift+ctrl+m"), &mut store).unwrap();

        assert_eq!(c.current().unwrap().combo, combo("Ctrl+Shift+M"));
        assert!(reg.is_registered(&combo("Ctrl+Shift+M")));
        assert_eq!(reg.len(), 1);
        assert_eq!(store.0.as_deref(), Some("Ctrl+Shift+M"));
        assert!(c.trigger(&combo("Ctrl+Shift+M")));
        assert_eq!(toggle.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_and_store_deletes_value() {
        let (mut c, _, _) = controller();
        let mut store = MemoryStore::default();
        c.bind_and_store(combo("Ctrl+1"), &mut store).unwrap();
        c.clear_and_store(&mut store).unwrap();
        assert!(store.0.is_none());
        assert!(c.current().is_none());
    }

    #[test]
    fn error_display() {
        assert_eq!(
            HotkeyError::AlreadyBound(KeyCombo::new("Ctrl+M")).to_string(),
            "Hotkey already bound: Ctrl+M"
        );
        assert!(HotkeyError::InvalidCombo("x".into()).to_string().contains("Invalid"));
    }
}
