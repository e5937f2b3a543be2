//! Keyboard lighting patterns.
//!
//! A pattern is the full 6×22 custom grid of a Chroma keyboard. Two are
//! built once at startup, one per mute state, and pushed unchanged on every
//! refresh.

use super::color::Rgb;

pub const ROWS: usize = 6;
pub const COLS: usize = 22;

/// Grid position of the Macro-4 key (left macro column).
pub const MACRO4: (usize, usize) = (4, 0);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightingPattern {
    grid: [[Rgb; COLS]; ROWS],
}

impl LightingPattern {
    /// Every key the same colour.
    pub fn filled(color: Rgb) -> Self {
        Self {
            grid: [[color; COLS]; ROWS],
        }
    }

    /// Set one key; out-of-range positions are ignored.
    pub fn with_key(mut self, (row, col): (usize, usize), color: Rgb) -> Self {
        if let Some(cell) = self.grid.get_mut(row).and_then(|r| r.get_mut(col)) {
            *cell = color;
        }
        self
    }

    pub fn key(&self, row: usize, col: usize) -> Option<Rgb> {
        self.grid.get(row).and_then(|r| r.get(col)).copied()
    }

    /// Rows of packed `0x00BBGGRR` values, the Chroma `CHROMA_CUSTOM` layout.
    pub fn to_bgr_rows(&self) -> Vec<Vec<u32>> {
        self.grid
            .iter()
            .map(|row| row.iter().map(|c| c.to_bgr()).collect())
            .collect()
    }
}

/// The two pre-built patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternSet {
    pub muted: LightingPattern,
    pub unmuted: LightingPattern,
}

impl PatternSet {
    /// Muted: whole board in `muted_color`. Unmuted: whole board in
    /// `unmuted_color`. With `accent`, Macro-4 shows the other colour.
    pub fn new(muted_color: Rgb, unmuted_color: Rgb, accent: bool) -> Self {
        let mut muted = LightingPattern::filled(muted_color);
        let mut unmuted = LightingPattern::filled(unmuted_color);
        if accent {
            muted = muted.with_key(MACRO4, unmuted_color);
            unmuted = unmuted.with_key(MACRO4, muted_color);
        }
        Self { muted, unmuted }
    }

    pub fn for_muted(&self, muted: bool) -> &LightingPattern {
        if muted { &self.muted } else { &self.unmuted }
    }
}

impl Default for PatternSet {
    fn default() -> Self {
        Self::new(Rgb::RED, Rgb::GREEN, true)
    }
}
