//! Configuration commands.

use std::path::Path;

use clap::Subcommand;
use console::style;

use mp_core::config::{AppConfig, ConfigHandle};
use mp_core::error::{MpError, MpResult};
use crate::OutputFormat;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the configuration as saved on disk.
    Show,
    /// Print the config file location.
    Path,
    /// Get a single value by key path.
    Get {
        /// Key path (e.g., "server.ws_url", "socket.reconnection_attempts").
        key: String,
    },
    /// Set a single value by key path and save.
    Set {
        /// Key path (e.g., "server.ws_url", "socket.reconnection_delay_ms").
        key: String,
        /// New value.
        value: String,
    },
    /// Set the access token and save.
    SetToken {
        /// Access token issued by the MebelPlace API.
        token: String,
    },
    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

/// Mask all but the last four characters of a secret.
fn mask(secret: &str) -> String {
    let count = secret.chars().count();
    if count == 0 {
        return "(none)".to_string();
    }
    if count <= 4 {
        return "****".to_string();
    }
    let tail: String = secret.chars().skip(count - 4).collect();
    format!("****{tail}")
}

fn get_value(cfg: &AppConfig, key: &str) -> Option<String> {
    match key {
        "server.ws_url" | "url" => Some(cfg.server.ws_url.clone()),
        "auth.access_token" | "token" => Some(mask(&cfg.auth.access_token)),
        "socket.reconnection_attempts" => Some(cfg.socket.reconnection_attempts.to_string()),
        "socket.reconnection_delay_ms" => Some(cfg.socket.reconnection_delay_ms.to_string()),
        "logging.level" => Some(cfg.logging.level.clone()),
        "logging.directory" => Some(cfg.logging.directory.clone()),
        "logging.json_output" => Some(cfg.logging.json_output.to_string()),
        _ => None,
    }
}

fn set_value(cfg: &mut AppConfig, key: &str, value: &str) -> Result<(), String> {
    match key {
        "server.ws_url" | "url" => {
            let url = AppConfig::sanitize_ws_url(value);
            if url.is_empty() {
                return Err("url must not be empty".to_string());
            }
            cfg.server.ws_url = url;
        }
        "auth.access_token" | "token" => {
            cfg.auth.access_token = value.trim().to_string();
        }
        "socket.reconnection_attempts" => {
            cfg.socket.reconnection_attempts =
                value.parse().map_err(|_| "invalid integer".to_string())?;
        }
        "socket.reconnection_delay_ms" => {
            cfg.socket.reconnection_delay_ms =
                value.parse().map_err(|_| "invalid integer".to_string())?;
        }
        "logging.level" => {
            let v = value.to_lowercase();
            if !["trace", "debug", "info", "warn", "error"].contains(&v.as_str()) {
                return Err("expected one of: trace, debug, info, warn, error".to_string());
            }
            cfg.logging.level = v;
        }
        "logging.directory" => {
            cfg.logging.directory = value.to_string();
        }
        "logging.json_output" => {
            cfg.logging.json_output =
                value.parse().map_err(|_| "expected true/false".to_string())?;
        }
        _ => return Err(format!("unknown config key: {key}")),
    }
    Ok(())
}

fn print_config_text(cfg: &AppConfig) {
    println!("{}", style("Server").bold().underlined());
    println!("  server.ws_url                  {}", cfg.server.ws_url);

    println!();
    println!("{}", style("Auth").bold().underlined());
    println!("  auth.access_token              {}", mask(&cfg.auth.access_token));

    println!();
    println!("{}", style("Socket").bold().underlined());
    println!("  socket.reconnection_attempts   {}", cfg.socket.reconnection_attempts);
    println!("  socket.reconnection_delay_ms   {}", cfg.socket.reconnection_delay_ms);

    println!();
    println!("{}", style("Logging").bold().underlined());
    println!("  logging.level                  {}", cfg.logging.level);
    println!("  logging.directory              {}", cfg.logging.directory);
    println!("  logging.json_output            {}", cfg.logging.json_output);
}

fn config_json(cfg: &AppConfig) -> serde_json::Value {
    serde_json::json!({
        "server": { "ws_url": cfg.server.ws_url },
        "auth": { "access_token": mask(&cfg.auth.access_token) },
        "socket": {
            "reconnection_attempts": cfg.socket.reconnection_attempts,
            "reconnection_delay_ms": cfg.socket.reconnection_delay_ms,
        },
        "logging": {
            "level": cfg.logging.level,
            "directory": cfg.logging.directory,
            "json_output": cfg.logging.json_output,
        },
    })
}

pub async fn run(
    config: ConfigHandle,
    path: &Path,
    action: ConfigAction,
    format: OutputFormat,
) -> MpResult<()> {
    match action {
        ConfigAction::Show => {
            let cfg = config.read().await;
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&config_json(&cfg)).unwrap_or_default());
                }
                OutputFormat::Text => print_config_text(&cfg),
            }
        }
        ConfigAction::Path => match format {
            OutputFormat::Json => println!("{}", serde_json::json!({ "path": path })),
            OutputFormat::Text => println!("{}", path.display()),
        },
        ConfigAction::Get { key } => {
            let cfg = config.read().await;
            let value = get_value(&cfg, &key)
                .ok_or_else(|| MpError::Config(format!("unknown config key: {key}")))?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::json!({ "key": key, "value": value })),
                OutputFormat::Text => println!("{key} = {value}"),
            }
        }
        ConfigAction::Set { key, value } => {
            {
                let mut cfg = config.write().await;
                let mut updated = cfg.clone();
                set_value(&mut updated, &key, &value)
                    .map_err(|e| MpError::Config(format!("failed to set {key}: {e}")))?;
                updated.validate()?;
                *cfg = updated;
            }
            config.save_to(path).await?;
            println!("{} {} updated", style("OK").green().bold(), key);
        }
        ConfigAction::SetToken { token } => {
            config.write().await.auth.access_token = token.trim().to_string();
            config.save_to(path).await?;
            println!("{} Access token saved to {}", style("OK").green().bold(), path.display());
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                println!(
                    "{} {} already exists (use --force to overwrite)",
                    style("WARN").yellow().bold(),
                    path.display()
                );
                return Ok(());
            }
            AppConfig::default().save_to_file(path)?;
            println!("{} Wrote default config to {}", style("OK").green().bold(), path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask() {
        assert_eq!(mask(""), "(none)");
        assert_eq!(mask("abc"), "****");
        assert_eq!(mask("secret-token-1234"), "****1234");
    }

    #[test]
    fn test_get_and_set_values() {
        let mut cfg = AppConfig::default();
        set_value(&mut cfg, "url", "https://api.mebelplace.com.kz/").unwrap();
        assert_eq!(get_value(&cfg, "server.ws_url").unwrap(), "wss://api.mebelplace.com.kz");

        set_value(&mut cfg, "socket.reconnection_attempts", "2").unwrap();
        assert_eq!(cfg.socket.reconnection_attempts, 2);
        assert!(set_value(&mut cfg, "socket.reconnection_delay_ms", "soon").is_err());
        assert!(set_value(&mut cfg, "logging.level", "loud").is_err());
        assert!(set_value(&mut cfg, "server.ws_url", "  ").is_err());
        assert!(set_value(&mut cfg, "database.path", "x").is_err());

        set_value(&mut cfg, "token", " abcdef123 ").unwrap();
        assert_eq!(cfg.auth.access_token, "abcdef123");
        assert_eq!(get_value(&cfg, "token").unwrap(), "****f123");
        assert!(get_value(&cfg, "nope").is_none());
    }

    #[tokio::test]
    async fn test_set_token_and_init_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        run(
            ConfigHandle::new(AppConfig::default()),
            &path,
            ConfigAction::Init { force: false },
            OutputFormat::Text,
        )
        .await
        .unwrap();
        assert!(path.exists());

        let handle = ConfigHandle::new(AppConfig::load_from_file(&path).unwrap());
        run(
            handle,
            &path,
            ConfigAction::SetToken { token: "tok-42".into() },
            OutputFormat::Json,
        )
        .await
        .unwrap();
        let saved = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(saved.token().as_deref(), Some("tok-42"));

        // Init without --force leaves the file alone.
        run(
            ConfigHandle::new(AppConfig::default()),
            &path,
            ConfigAction::Init { force: false },
            OutputFormat::Text,
        )
        .await
        .unwrap();
        assert_eq!(AppConfig::load_from_file(&path).unwrap().token().as_deref(), Some("tok-42"));
    }

    #[tokio::test]
    async fn test_set_leaves_config_unchanged_when_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let handle = ConfigHandle::new(AppConfig::default());
        let result = run(
            handle.clone(),
            &path,
            ConfigAction::Set { key: "url".into(), value: "market place.kz".into() },
            OutputFormat::Text,
        )
        .await;
        assert!(matches!(result, Err(MpError::InvalidUrl(_))));
        assert_eq!(handle.read().await.server.ws_url, "wss://mebelplace.com.kz");
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_set_rejects_unknown_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let result = run(
            ConfigHandle::new(AppConfig::default()),
            &path,
            ConfigAction::Set { key: "chat.id".into(), value: "1".into() },
            OutputFormat::Text,
        )
        .await;
        assert!(matches!(result, Err(MpError::Config(_))));
        assert!(!path.exists());
    }
}
