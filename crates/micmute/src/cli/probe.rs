//! `probe` subcommand: is any application capturing from the microphone?

use std::path::Path;

use super::{Result, kv, kv_indent, kv_width, print_json, usage};
use micmute_lib::usage::{JsonUsageStore, UsageProbe, UsageStore};

fn report(probe: &UsageProbe<impl UsageStore>, source: String, json: bool) -> Result<()> {
    let status = probe.probe();
    let consumers = probe.active_consumers();
    if json {
        return print_json(&super::status::usage_json(status, source, consumers));
    }
    let w = kv_width(&["Usage:", "Source:"], &["Consumer:"]);
    kv("Usage:", status, w);
    kv("Source:", source, w);
    for c in &consumers {
        kv_indent("Consumer:", c, w);
    }
    Ok(())
}

pub(super) fn cmd_probe(file: Option<&Path>, json: bool) -> Result<()> {
    match file {
        Some(path) => report(
            &UsageProbe::new(JsonUsageStore::new(path)),
            path.display().to_string(),
            json,
        ),
        None => {
            let source = if cfg!(windows) { "registry" } else { "none" };
            report(&UsageProbe::new(usage::platform_store()), source.into(), json)
        }
    }
}
