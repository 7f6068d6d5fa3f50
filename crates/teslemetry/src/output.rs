//! Output formatting: table, JSON, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one line per item.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use serde_json::Value;
use tabled::{Table, Tabled, settings::Style};

use teslemetry_core::EntityState;

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: &ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Human form of an entity state, colored when `color` is set.
pub fn format_state(state: &EntityState, color: bool) -> String {
    let flag = |on: Option<bool>| match (on, color) {
        (Some(true), true) => "on".green().to_string(),
        (Some(false), true) => "off".red().to_string(),
        (Some(true), false) => "on".into(),
        (Some(false), false) => "off".into(),
        (None, true) => "unknown".dimmed().to_string(),
        (None, false) => "unknown".into(),
    };
    match state {
        EntityState::Sensor(Some(Value::String(s))) => s.clone(),
        EntityState::Sensor(Some(v)) => v.to_string(),
        EntityState::Sensor(None) if color => "unknown".dimmed().to_string(),
        EntityState::Sensor(None) => "unknown".into(),
        EntityState::BinarySensor(on) | EntityState::Switch(on) => flag(*on),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serializable items in the chosen format.
pub fn render_list<T, R>(
    format: &OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    plain_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    Ok(match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            render_table(&rows)
        }
        OutputFormat::Json => serde_json::to_string_pretty(data)?,
        OutputFormat::JsonCompact => serde_json::to_string(data)?,
        OutputFormat::Plain => data.iter().map(&plain_fn).collect::<Vec<_>>().join("\n"),
    })
}

/// Render a single item. Table mode uses `detail_fn` for a free-form view.
pub fn render_single<T>(
    format: &OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
{
    Ok(match format {
        OutputFormat::Table | OutputFormat::Plain => detail_fn(data),
        OutputFormat::Json => serde_json::to_string_pretty(data)?,
        OutputFormat::JsonCompact => serde_json::to_string(data)?,
    })
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}
