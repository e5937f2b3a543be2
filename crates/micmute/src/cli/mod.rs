//! CLI subcommands: microphone status, mute control, usage probe,
//! headless reconciliation and settings.

mod config_cmd;
mod hotkey;
mod mute;
mod probe;
mod status;
mod watch;

use std::path::{Path, PathBuf};

use clap::Subcommand;
use serde::Serialize;

pub(super) use crate::RUNNING;
pub(super) use micmute_lib::audio;
pub(super) use micmute_lib::config::Config;
pub(super) use micmute_lib::error::Result;
pub(super) use micmute_lib::usage;

const PADDING: usize = 2;

/// Compute alignment width for a command's key-value output.
/// Ensures at least PADDING spaces after the longest key in either level,
/// with top-level and indent values aligned to the same column.
pub(super) fn kv_width(top: &[&str], indent: &[&str]) -> usize {
    let top_max = top.iter().map(|k| k.len()).max().unwrap_or(0);
    let indent_max = indent.iter().map(|k| k.len()).max().unwrap_or(0);
    let top_need = if top.is_empty() { 0 } else { top_max + PADDING };
    // Indent keys lose 2 chars of inner width to the "  " prefix
    let indent_need = if indent.is_empty() {
        0
    } else {
        indent_max + PADDING + 2
    };
    top_need.max(indent_need)
}

pub(super) fn format_kv(key: &str, value: impl std::fmt::Display, w: usize) -> String {
    format!("{key:<width$}{value}", width = w)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{}", format_kv(key, value, w));
}

pub(super) fn kv_indent(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("  {key:<width$}{value}", width = w - 2);
}

pub(super) fn print_json(value: &impl Serialize) -> Result<()> {
    let s = serde_json::to_string_pretty(value)
        .map_err(|e| micmute_lib::MicmuteError::Config(format!("JSON output: {e}")))?;
    println!("{s}");
    Ok(())
}

/// Config file in effect: `--config` or the platform default.
pub(super) fn config_path(custom: Option<&Path>) -> Option<PathBuf> {
    custom.map(Path::to_path_buf).or_else(Config::path)
}

pub(super) fn load_config(custom: Option<&Path>) -> Config {
    let Some(path) = config_path(custom) else {
        return Config::default();
    };
    let (config, warnings) = Config::load_from(&path);
    for w in &warnings {
        log::warn!("{w}");
    }
    config
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct MicrophoneJson {
    pub id: String,
    pub name: String,
    pub muted: bool,
}

#[derive(Serialize)]
pub(super) struct UsageJson {
    pub status: &'static str,
    pub in_use: bool,
    pub source: String,
    pub consumers: Vec<String>,
}

#[derive(Serialize)]
pub(super) struct StatusOutput {
    pub version: String,
    pub audio_backend: Option<String>,
    pub microphone: Option<MicrophoneJson>,
    pub usage: UsageJson,
    pub hotkey: Option<String>,
    pub lighting_enabled: bool,
}

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub settings: Config,
    pub problems: Vec<String>,
}

#[derive(Serialize)]
pub(super) struct MuteOutput {
    pub device: Option<String>,
    pub muted: Option<bool>,
    pub changed: bool,
}

#[derive(Serialize)]
pub(super) struct HotkeyOutput {
    pub hotkey: Option<String>,
    pub config_file: Option<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show microphone, usage and settings status
    Status,

    /// Toggle mute on the default capture device
    Toggle,

    /// Mute the default capture device
    Mute,

    /// Unmute the default capture device
    Unmute,

    /// Check whether any application is capturing from the microphone
    Probe {
        /// Read usage records from a JSON snapshot instead of the OS store
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,
    },

    /// Run the indicator without a tray (prints icon changes, drives lighting)
    Watch {
        /// Read usage records from a JSON snapshot instead of the OS store
        #[arg(long, value_name = "PATH")]
        usage_file: Option<PathBuf>,
        /// Leave keyboard lighting alone
        #[arg(long)]
        no_lighting: bool,
    },

    /// Show current configuration and file paths
    Config,

    /// Show or change the persisted toggle hotkey
    Hotkey {
        #[command(subcommand)]
        action: HotkeyCommand,
    },
}

#[derive(Subcommand)]
pub enum HotkeyCommand {
    /// Print the stored hotkey
    Show,
    /// Store a new hotkey, e.g. "Ctrl+Shift+M"
    Set {
        /// Key combination
        combo: String,
    },
    /// Remove the stored hotkey
    Clear,
}

/// Options shared by every subcommand.
pub struct GlobalOpts {
    pub json: bool,
    pub config: Option<PathBuf>,
}

/// Warn if `--json` was passed to a command that doesn't support it.
fn warn_json_unsupported(cmd_name: &str) {
    log::warn!("--json is not supported for `{cmd_name}` (ignored)");
}

pub fn run(cmd: Command, opts: &GlobalOpts) -> Result<()> {
    let custom = opts.config.as_deref();
    match cmd {
        Command::Status => status::cmd_status(opts.json, custom),
        Command::Toggle => mute::cmd_set_mute(mute::MuteAction::Toggle, opts.json),
        Command::Mute => mute::cmd_set_mute(mute::MuteAction::Mute, opts.json),
        Command::Unmute => mute::cmd_set_mute(mute::MuteAction::Unmute, opts.json),
        Command::Probe { file } => probe::cmd_probe(file.as_deref(), opts.json),
        Command::Watch {
            usage_file,
            no_lighting,
        } => {
            if opts.json {
                warn_json_unsupported("watch");
            }
            watch::cmd_watch(custom, usage_file.as_deref(), no_lighting)
        }
        Command::Config => config_cmd::cmd_config(opts.json, custom),
        Command::Hotkey { action } => hotkey::cmd_hotkey(action, opts.json, custom),
    }
}
