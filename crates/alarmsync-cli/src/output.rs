use std::fs;
use std::path::{Path, PathBuf};

use alarmsync_core::{
    Command, ConfigState, EntitySnapshot, EntityState, Published, Reconciliation,
    SnapshotGeneration,
};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Ndjson,
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))
}

// A missing file is a fresh account.
pub fn load_config_state(path: &Path) -> Result<ConfigState> {
    if !path.exists() {
        return Ok(ConfigState::default());
    }
    load_json(path)
}

// Sibling temp file, then rename.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = temp_sibling(path);
    let body = serde_json::to_string_pretty(value)?;
    fs::write(&tmp, body + "\n").with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "config.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}

pub fn parse_command(name: &str) -> Result<Command> {
    let normalized = name.trim().to_ascii_lowercase().replace('-', "_");
    serde_json::from_value(Value::String(normalized)).map_err(|_| anyhow!("unknown command {name:?}"))
}

pub fn parse_value(text: &str) -> Result<Value> {
    if text.trim().is_empty() {
        return Err(anyhow!("empty value"));
    }
    Ok(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())))
}

pub fn print_published(published: &Published, format: OutputFormat) -> Result<()> {
    print_generation(&published.generation, Some((published.seq, published.fetched_at)), format)
}

pub fn print_generation(
    generation: &SnapshotGeneration,
    meta: Option<(u64, Option<DateTime<Utc>>)>,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let entities: Vec<&EntitySnapshot> = generation.entities().collect();
            let out = serde_json::json!({
                "seq": meta.map(|(seq, _)| seq),
                "fetched_at": meta.and_then(|(_, ts)| ts),
                "entities": entities,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Ndjson => {
            for entity in generation.entities() {
                println!("{}", serde_json::to_string(entity)?);
            }
        }
        OutputFormat::Human => print!("{}", render_generation(generation, meta)),
    }
    Ok(())
}

pub fn print_entity(entity: &EntitySnapshot, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(entity)?),
        OutputFormat::Ndjson => println!("{}", serde_json::to_string(entity)?),
        OutputFormat::Human => println!("{}", render_entity(entity)),
    }
    Ok(())
}

pub fn print_reconciliation(plan: &Reconciliation, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(plan)?),
        OutputFormat::Ndjson => println!("{}", serde_json::to_string(plan)?),
        OutputFormat::Human => print!("{}", render_reconciliation(plan)),
    }
    Ok(())
}

pub fn render_generation(
    generation: &SnapshotGeneration,
    meta: Option<(u64, Option<DateTime<Utc>>)>,
) -> String {
    let mut out = String::new();
    match meta {
        Some((seq, fetched_at)) => {
            out.push_str(&format!("=== Snapshot #{seq} ===\n"));
            let ts = fetched_at.map_or_else(|| "n/a".to_string(), |ts| ts.to_rfc3339());
            out.push_str(&format!("Fetched:    {ts}\n"));
        }
        None => out.push_str("=== Snapshot ===\n"),
    }
    out.push_str(&format!("Entities:   {}\n", generation.len()));
    for entity in generation.entities() {
        out.push_str("  ");
        out.push_str(&render_entity(entity));
        out.push('\n');
    }
    out
}

pub fn render_entity(entity: &EntitySnapshot) -> String {
    let mut line = format!(
        "{:<28} {:<20} {:<24} {}",
        entity.id,
        format!("{:?}", entity.kind),
        entity.name,
        state_label(&entity.state)
    );
    if let Some(transition) = entity.transition() {
        line.push_str(&format!(" ({transition:?})"));
    }
    if !entity.is_available() {
        line.push_str(" [unavailable]");
    }
    line
}

pub fn render_reconciliation(plan: &Reconciliation) -> String {
    if plan.is_empty() {
        return "Registry is up to date\n".to_string();
    }
    let mut out = String::new();
    for id in &plan.entities_to_remove {
        out.push_str(&format!("remove entity {id}\n"));
    }
    for id in &plan.devices_to_remove {
        out.push_str(&format!("remove device {id}\n"));
    }
    out
}

pub fn state_label(state: &EntityState) -> String {
    let Ok(value) = serde_json::to_value(state) else {
        return "?".to_string();
    };
    match value.get("value") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("?")
            .to_string(),
    }
}
