//! Emit command - send a single client event on a channel.

use std::time::Duration;

use console::style;
use serde_json::Value;
use tracing::info;

use mp_channels::{Channel, ChannelRegistry};
use mp_core::config::ConfigHandle;
use mp_core::error::{MpError, MpResult};
use mp_socket::Envelope;
use crate::OutputFormat;

/// Time given to the writer task to flush the frame before closing.
const FLUSH_GRACE: Duration = Duration::from_millis(200);

/// Parse the optional JSON payload argument; absent means `null`.
pub fn parse_payload(data: Option<&str>) -> MpResult<Value> {
    match data {
        None => Ok(Value::Null),
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| MpError::Serialization(format!("payload is not valid JSON: {e}"))),
    }
}

/// Run the emit command.
pub async fn run(
    config: ConfigHandle,
    channel: Channel,
    event: String,
    data: Option<String>,
    timeout_secs: u64,
    format: OutputFormat,
) -> MpResult<()> {
    let payload = parse_payload(data.as_deref())?;
    let cfg = config.read().await.clone();
    cfg.validate()?;

    let registry = ChannelRegistry::from_app_config(&cfg);
    let connection = registry.get(channel)?;

    if let OutputFormat::Text = format {
        println!("{} Connecting to {}...", style("[1/2]").bold().dim(), channel);
    }
    connection.connect();
    if let Err(e) = super::wait_connected(&connection, Duration::from_secs(timeout_secs)).await {
        registry.shutdown();
        return Err(e);
    }

    if let OutputFormat::Text = format {
        println!("{} Sending {}...", style("[2/2]").bold().dim(), event);
    }
    connection.emit(&event, payload.clone());
    info!("emitted {event} on {channel}");
    tokio::time::sleep(FLUSH_GRACE).await;
    registry.shutdown();

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "channel": channel,
                "sent": Envelope::new(event, payload),
            });
            println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
        }
        OutputFormat::Text => {
            println!("{} Event sent", style("OK").green().bold());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_payload() {
        assert_eq!(parse_payload(None).unwrap(), Value::Null);
        assert_eq!(
            parse_payload(Some(r#"{"chat_id": 7}"#)).unwrap(),
            json!({"chat_id": 7})
        );
        assert!(matches!(
            parse_payload(Some("{chat_id")),
            Err(MpError::Serialization(_))
        ));
    }
}
