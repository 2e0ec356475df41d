//! Status command - probe every channel endpoint.

use std::time::{Duration, Instant};

use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};
use console::style;
use serde::Serialize;
use tracing::debug;

use mp_channels::{Channel, ChannelRegistry};
use mp_core::config::ConfigHandle;
use mp_core::constants::reserved_events;
use mp_core::error::MpResult;
use mp_socket::Connection;
use crate::OutputFormat;

#[derive(Debug, Serialize)]
struct ChannelStatus {
    channel: Channel,
    url: String,
    connected: bool,
    latency_ms: Option<u128>,
    error: Option<String>,
}

/// Last `error` event message seen on the tap, if any.
fn last_error(rx: &mut tokio::sync::broadcast::Receiver<mp_socket::Envelope>) -> Option<String> {
    let mut last = None;
    while let Ok(envelope) = rx.try_recv() {
        if envelope.event == reserved_events::ERROR {
            last = envelope.data["message"].as_str().map(str::to_string);
        }
    }
    last
}

async fn probe(
    connection: &Connection,
    base_url: &str,
    channel: Channel,
    timeout: Duration,
) -> ChannelStatus {
    let mut tap = connection.dispatcher().subscribe_all();
    let start = Instant::now();
    connection.connect();
    let result = super::wait_connected(connection, timeout).await;
    let latency_ms = start.elapsed().as_millis();
    debug!("probe {channel}: {result:?} after {latency_ms}ms");

    let connected = result.is_ok();
    let error = if connected {
        None
    } else {
        last_error(&mut tap).or_else(|| result.err().map(|e| e.to_string()))
    };
    connection.disconnect();

    ChannelStatus {
        channel,
        url: format!("{}{}", base_url.trim_end_matches('/'), channel.path()),
        connected,
        latency_ms: connected.then_some(latency_ms),
        error,
    }
}

/// Run the status command.
pub async fn run(config: ConfigHandle, timeout_secs: u64, format: OutputFormat) -> MpResult<()> {
    let cfg = config.read().await.clone();
    cfg.validate()?;
    let registry = ChannelRegistry::from_app_config(&cfg);
    let timeout = Duration::from_secs(timeout_secs);

    let mut statuses = Vec::with_capacity(Channel::ALL.len());
    for channel in Channel::ALL {
        let connection = registry.get(channel)?;
        statuses.push(probe(&connection, &cfg.server.ws_url, channel, timeout).await);
    }
    registry.shutdown();

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "server": cfg.server.ws_url,
                "authenticated": cfg.token().is_some(),
                "channels": statuses,
            });
            println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
        }
        OutputFormat::Text => {
            println!("{}", style("Connection").bold().underlined());
            println!("  Server:  {}", cfg.server.ws_url);
            println!(
                "  Token:   {}",
                if cfg.token().is_some() {
                    style("configured").green().to_string()
                } else {
                    style("none (anonymous)").yellow().to_string()
                }
            );
            println!();

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["Channel", "URL", "Status", "Detail"]);

            for status in &statuses {
                let state = if status.connected {
                    style("connected").green().to_string()
                } else {
                    style("unreachable").red().to_string()
                };
                let detail = match (&status.latency_ms, &status.error) {
                    (Some(ms), _) => format!("{ms}ms"),
                    (None, Some(err)) => super::truncate(err, 60),
                    (None, None) => "-".to_string(),
                };
                table.add_row(vec![
                    status.channel.to_string(),
                    status.url.clone(),
                    state,
                    detail,
                ]);
            }
            println!("{table}");
        }
    }

    Ok(())
}
