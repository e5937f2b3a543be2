//! Tray icon construction and caching.

use std::sync::OnceLock;

use micmute_lib::sink::IconKind;
use tray_icon::Icon;

use crate::icon::{TRAY_ICON_SIZE, render};

// ── Icon cache (drawn once, cloned on use) ──

/// RGBA pixel data cached for cheap cloning into `Icon`.
struct CachedIcon {
    rgba: Vec<u8>,
    size: u32,
}

impl CachedIcon {
    fn draw(kind: IconKind) -> Self {
        Self {
            rgba: render(kind, TRAY_ICON_SIZE).into_raw(),
            size: TRAY_ICON_SIZE,
        }
    }

    fn to_icon(&self) -> Option<Icon> {
        match Icon::from_rgba(self.rgba.clone(), self.size, self.size) {
            Ok(icon) => Some(icon),
            Err(e) => {
                log::error!("icon creation failed: {e}");
                None
            }
        }
    }
}

fn cache(kind: IconKind) -> &'static CachedIcon {
    static ON: OnceLock<CachedIcon> = OnceLock::new();
    static OFF: OnceLock<CachedIcon> = OnceLock::new();
    static ERROR: OnceLock<CachedIcon> = OnceLock::new();
    let cell = match kind {
        IconKind::On => &ON,
        IconKind::Off => &OFF,
        IconKind::Error => &ERROR,
    };
    cell.get_or_init(|| CachedIcon::draw(kind))
}

pub fn tray_icon_for(kind: IconKind) -> Option<Icon> {
    cache(kind).to_icon()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_is_per_kind() {
        assert!(!std::ptr::eq(cache(IconKind::On), cache(IconKind::Off)));
        assert!(std::ptr::eq(cache(IconKind::Error), cache(IconKind::Error)));
        assert_eq!(cache(IconKind::On).rgba.len(), (32 * 32 * 4) as usize);
    }
}
