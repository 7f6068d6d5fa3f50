//! Watch command: follow entity changes and vehicle alerts.
//!
//! Each entity contributes its coordinator's version channel, plus its
//! streaming field channel when it has one. Any tick re-renders that one
//! entity and prints it if the state moved.

use futures_util::StreamExt;
use futures_util::stream::{BoxStream, SelectAll};
use tokio::sync::broadcast::error::RecvError;
use tokio_stream::wrappers::WatchStream;

use teslemetry_core::{EntityState, Teslemetry, VehicleAlert};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::matches_device;
use super::status::EntityView;

pub async fn handle(
    teslemetry: &Teslemetry,
    args: &WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let color = output::should_color(&global.color);
    let entities: Vec<_> = teslemetry
        .entities()
        .into_iter()
        .filter(|e| matches_device(e, args.device.as_deref()))
        .collect();
    let mut last: Vec<EntityState> = entities.iter().map(|e| e.state()).collect();

    let mut ticks: SelectAll<BoxStream<'static, usize>> = SelectAll::new();
    for (idx, entity) in entities.iter().enumerate() {
        ticks.push(
            WatchStream::from_changes(entity.subscribe())
                .map(move |_| idx)
                .boxed(),
        );
        if let Some(field) = entity.subscribe_stream() {
            ticks.push(field.into_stream().map(move |_| idx).boxed());
        }
    }
    let mut alerts = teslemetry.alerts();

    if !global.quiet {
        eprintln!("Watching {} entities, Ctrl-C to stop", entities.len());
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,

            Some(idx) = ticks.next() => {
                let Some(entity) = entities.get(idx) else { continue };
                let state = entity.state();
                if last.get(idx) == Some(&state) {
                    continue;
                }
                let view = EntityView::from(entity);
                let line = output::render_single(&global.output, &view, |v| {
                    format!("{}  {}  {}", v.device, v.key, output::format_state(&v.state, color))
                })?;
                output::print_output(&line, global.quiet);
                if let Some(slot) = last.get_mut(idx) {
                    *slot = state;
                }
            }

            alert = alerts.recv() => match alert {
                Ok(alert) => print_alert(&alert, global)?,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "alert listener lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

fn print_alert(alert: &VehicleAlert, global: &GlobalOpts) -> Result<(), CliError> {
    let line = match global.output {
        OutputFormat::Json | OutputFormat::JsonCompact => serde_json::to_string(alert)?,
        _ => format!(
            "{}  {} {}: {}",
            alert.timestamp.format("%Y-%m-%d %H:%M:%S"),
            alert.vin,
            alert.kind,
            alert.name
        ),
    };
    output::print_output(&line, global.quiet);
    Ok(())
}
