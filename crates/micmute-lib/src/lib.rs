//! MicMute: keeps a tray icon and keyboard lighting in step with the mute
//! state of the default microphone.

pub mod audio;
pub mod config;
pub mod error;
pub mod hotkey;
pub mod lighting;
pub mod presentation;
pub mod reconcile;
pub mod reconnect;
pub mod sink;
pub mod usage;
pub mod watcher;

pub use error::MicmuteError;
