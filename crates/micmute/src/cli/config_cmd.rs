//! `config` subcommand: show current configuration and file paths.

use std::path::Path;

use super::{Config, ConfigOutput, Result, config_path, kv, kv_indent, kv_width, print_json};
use micmute_lib::lighting::{format_color, parse_color};

fn color_display(value: &str) -> String {
    match parse_color(value) {
        Ok(rgb) => format_color(rgb),
        Err(_) => format!("{value} (invalid)"),
    }
}

pub(super) fn cmd_config(json: bool, custom_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(custom_path);
    let path = config_path(custom_path);
    let exists = path.as_ref().is_some_and(|p| p.exists());
    let problems: Vec<String> = match config.validate() {
        Ok(()) => Vec::new(),
        Err(errs) => errs.iter().map(ToString::to_string).collect(),
    };

    if json {
        let output = ConfigOutput {
            config_file: path.as_ref().map(|p| p.display().to_string()),
            config_file_exists: exists,
            settings: config,
            problems,
        };
        return print_json(&output);
    }

    let w = kv_width(
        &["Config file:", "Log file:"],
        &[
            "hotkey:",
            "tick_interval_ms:",
            "lighting_enabled:",
            "muted_color:",
            "unmuted_color:",
            "accent_key_enabled:",
            "chroma_url:",
        ],
    );

    match &path {
        Some(p) if exists => kv("Config file:", format_args!("{} (loaded)", p.display()), w),
        Some(p) => kv(
            "Config file:",
            format_args!("{} (not found, using defaults)", p.display()),
            w,
        ),
        None => kv("Config file:", "(no config directory)", w),
    }
    if let Some(log) = Config::log_path() {
        kv("Log file:", log.display(), w);
    }
    println!();

    println!("Settings:");
    kv_indent("hotkey:", config.hotkey.as_deref().unwrap_or("(none)"), w);
    kv_indent(
        "tick_interval_ms:",
        format_args!("{} (effective {:?})", config.tick_interval_ms, config.tick_interval()),
        w,
    );
    kv_indent("lighting_enabled:", config.lighting_enabled, w);
    kv_indent("muted_color:", color_display(&config.muted_color), w);
    kv_indent("unmuted_color:", color_display(&config.unmuted_color), w);
    kv_indent("accent_key_enabled:", config.accent_key_enabled, w);
    kv_indent("chroma_url:", &config.chroma_url, w);

    if !problems.is_empty() {
        println!();
        println!("Problems:");
        for p in &problems {
            println!("  {p}");
        }
    }
    Ok(())
}
