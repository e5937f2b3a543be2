//! `hotkey` subcommand: show, set or clear the persisted toggle hotkey.

use std::path::Path;

use super::{HotkeyCommand, HotkeyOutput, Result, config_path, print_json};
use micmute_lib::MicmuteError;
use micmute_lib::config::ConfigStore;
use micmute_lib::hotkey::{HotkeyStore, KeyCombo};

pub(super) fn cmd_hotkey(action: HotkeyCommand, json: bool, custom: Option<&Path>) -> Result<()> {
    let path = config_path(custom)
        .ok_or_else(|| MicmuteError::Config("no config directory; pass --config".into()))?;
    let mut store = ConfigStore::new(&path);

    let hotkey = match action {
        HotkeyCommand::Show => store.load(),
        HotkeyCommand::Set { combo } => {
            let combo = KeyCombo::parse(&combo)?;
            store.store(&combo)?;
            log::info!("hotkey set to {combo}");
            Some(combo.to_string())
        }
        HotkeyCommand::Clear => {
            store.clear()?;
            None
        }
    };

    if json {
        return print_json(&HotkeyOutput {
            hotkey,
            config_file: Some(path.display().to_string()),
        });
    }
    match hotkey {
        Some(h) => println!("Hotkey: {h}"),
        None => println!("Hotkey: (none)"),
    }
    Ok(())
}
