//! Microphone glyphs drawn at runtime for the tray and dialog windows.
//!
//! One shape, three tints: green while live, red with a slash while muted,
//! grey with a slash when there is no capture device.

use eframe::egui;
use image::{Rgba, RgbaImage};
use micmute_lib::sink::IconKind;

/// Tray icon edge length. Windows tray icons range from 16 px (100 % DPI)
/// to 32 px (200 % DPI), so the worst-case downscale is only 2:1.
pub const TRAY_ICON_SIZE: u32 = 32;

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);
const SLASH: Rgba<u8> = Rgba([250, 250, 250, 255]);

fn tint(kind: IconKind) -> Rgba<u8> {
    match kind {
        IconKind::On => Rgba([46, 204, 64, 255]),
        IconKind::Off => Rgba([224, 48, 48, 255]),
        IconKind::Error => Rgba([128, 128, 128, 255]),
    }
}

/// Distance from `p` to the segment `a`-`b`.
fn segment_distance(p: (f32, f32), a: (f32, f32), b: (f32, f32)) -> f32 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len2 = dx * dx + dy * dy;
    let t = if len2 == 0.0 {
        0.0
    } else {
        (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len2).clamp(0.0, 1.0)
    };
    let (cx, cy) = (a.0 + t * dx, a.1 + t * dy);
    ((p.0 - cx).powi(2) + (p.1 - cy).powi(2)).sqrt()
}

/// Whether a point on the 32-unit design grid belongs to the microphone.
fn in_microphone(x: f32, y: f32) -> bool {
    // Capsule
    if segment_distance((x, y), (16.0, 9.0), (16.0, 15.0)) <= 5.0 {
        return true;
    }
    // Holder: lower half ring around the capsule
    let r = ((x - 16.0).powi(2) + (y - 15.0).powi(2)).sqrt();
    if y >= 15.0 && (8.0..=10.0).contains(&r) {
        return true;
    }
    // Stem and base
    ((15.0..=17.0).contains(&x) && (24.0..=28.0).contains(&y))
        || ((10.0..=22.0).contains(&x) && (27.0..=29.0).contains(&y))
}

fn in_slash(x: f32, y: f32) -> bool {
    segment_distance((x, y), (6.0, 5.0), (26.0, 27.0)) <= 1.6
}

/// Draw the glyph for `kind` at `size` x `size` pixels.
pub fn render(kind: IconKind, size: u32) -> RgbaImage {
    let scale = 32.0 / size as f32;
    let color = tint(kind);
    let slashed = kind != IconKind::On;
    RgbaImage::from_fn(size, size, |px, py| {
        let x = (px as f32 + 0.5) * scale;
        let y = (py as f32 + 0.5) * scale;
        if slashed && in_slash(x, y) {
            SLASH
        } else if in_microphone(x, y) {
            color
        } else {
            TRANSPARENT
        }
    })
}

/// Window icon for egui dialogs.
pub fn app_icon() -> egui::IconData {
    let img = render(IconKind::On, 64);
    let (w, h) = img.dimensions();
    egui::IconData {
        rgba: img.into_raw(),
        width: w,
        height: h,
    }
}
