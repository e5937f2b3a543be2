//! Global hotkey registrar backed by the OS hotkey table.

use std::collections::HashMap;

use global_hotkey::{GlobalHotKeyManager, hotkey::HotKey};
use micmute_lib::hotkey::{HotkeyError, HotkeyRegistrar, KeyCombo};

/// Registers combinations with `global-hotkey` and remembers which event id
/// belongs to which combination.
pub struct GlobalRegistrar {
    manager: GlobalHotKeyManager,
    registered: HashMap<u32, (KeyCombo, HotKey)>,
}

impl GlobalRegistrar {
    pub fn new() -> micmute_lib::error::Result<Self> {
        let manager = GlobalHotKeyManager::new().map_err(|e| {
            micmute_lib::MicmuteError::Config(format!("Failed to init hotkey manager: {e}"))
        })?;
        Ok(Self {
            manager,
            registered: HashMap::new(),
        })
    }

    /// Combination behind a hotkey event id.
    pub fn combo_for_id(&self, id: u32) -> Option<&KeyCombo> {
        self.registered.get(&id).map(|(combo, _)| combo)
    }
}

pub(crate) fn to_hotkey(combo: &KeyCombo) -> Result<HotKey, HotkeyError> {
    combo
        .as_str()
        .parse::<HotKey>()
        .map_err(|e| HotkeyError::InvalidCombo(format!("{combo}: {e}")))
}

/// Map a `global-hotkey` failure onto the conflict/other split.
fn map_error(combo: &KeyCombo, e: global_hotkey::Error) -> HotkeyError {
    match e {
        global_hotkey::Error::AlreadyRegistered(_) | global_hotkey::Error::FailedToRegister(_) => {
            HotkeyError::AlreadyBound(combo.clone())
        }
        other => HotkeyError::Registration(other.to_string()),
    }
}

impl HotkeyRegistrar for GlobalRegistrar {
    fn register(&mut self, combo: &KeyCombo) -> Result<(), HotkeyError> {
        let hotkey = to_hotkey(combo)?;
        if self.registered.contains_key(&hotkey.id()) {
            return Err(HotkeyError::AlreadyBound(combo.clone()));
        }
        self.manager
            .register(hotkey)
            .map_err(|e| map_error(combo, e))?;
        self.registered
            .insert(hotkey.id(), (combo.clone(), hotkey));
        Ok(())
    }

    fn unregister(&mut self, combo: &KeyCombo) -> Result<(), HotkeyError> {
        let hotkey = to_hotkey(combo)?;
        if self.registered.remove(&hotkey.id()).is_some() {
            self.manager
                .unregister(hotkey)
                .map_err(|e| HotkeyError::Registration(e.to_string()))?;
        }
        Ok(())
    }
}
