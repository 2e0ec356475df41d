//! Listen command - tail the events of one channel until Ctrl+C.

use std::time::Duration;

use chrono::Utc;
use console::style;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use mp_channels::{
    Channel, ChannelHook, ChannelRegistry, ChatChannel, LoggedMessage, NotificationsChannel,
    Presence, RequestsChannel, TypingIndicator,
};
use mp_core::config::ConfigHandle;
use mp_core::constants::reserved_events;
use mp_core::error::MpResult;
use mp_socket::events::{ChatId, RequestId};
use mp_socket::{Envelope, ServerEvent, ServerEventKind, UserRef};
use crate::OutputFormat;

const FLUSH_GRACE: Duration = Duration::from_millis(200);

/// Adapter kept mounted for the lifetime of the listener.
enum Mounted {
    Chat(ChatChannel),
    Requests(RequestsChannel),
    Notifications(NotificationsChannel),
    Raw(ChannelHook),
}

impl Mounted {
    fn hook(&self) -> &ChannelHook {
        match self {
            Self::Chat(chat) => chat.hook(),
            Self::Requests(requests) => requests.hook(),
            Self::Notifications(notifications) => notifications.hook(),
            Self::Raw(hook) => hook,
        }
    }
}

fn mount(
    registry: &ChannelRegistry,
    channel: Channel,
    chat_id: Option<ChatId>,
) -> MpResult<Mounted> {
    Ok(match channel {
        Channel::Chats if chat_id.is_some() => Mounted::Chat(registry.chat(chat_id)?),
        Channel::Chats => Mounted::Raw(ChannelHook::mount(registry.get(channel)?, true)),
        Channel::Requests => Mounted::Requests(registry.requests()?),
        Channel::Notifications => Mounted::Notifications(registry.notifications()?),
    })
}

/// Whether `event` passes the `--event` filter. Reserved events always pass.
fn should_print(filter: &[String], event: &str) -> bool {
    filter.is_empty()
        || ServerEventKind::from_name(event).is_reserved()
        || filter.iter().any(|f| f == event)
}

/// Warnings for `--event` names that can never match on `channel`.
fn filter_warnings(channel: Channel, filter: &[String]) -> Vec<String> {
    filter
        .iter()
        .filter_map(|name| {
            let kind = ServerEventKind::from_name(name);
            if !ServerEventKind::all_event_names().contains(&name.as_str()) {
                Some(format!("unknown event `{name}`; it will only match custom server events"))
            } else if channel != Channel::Chats && (kind.is_chat_event() || kind.is_presence_event()) {
                Some(format!("`{name}` is only sent on the chats channel"))
            } else {
                None
            }
        })
        .collect()
}

/// One-line summary of a typed event; `None` falls back to raw JSON.
fn describe(event: &ServerEvent) -> Option<String> {
    let who = |user: &UserRef| match &user.user_name {
        Some(name) => format!("{name} (#{})", user.user_id),
        None => format!("#{}", user.user_id),
    };
    Some(match event {
        ServerEvent::NewMessage(p) => {
            let sender = p.message.sender.as_ref().map_or("?".to_string(), |s| {
                s.name.clone().unwrap_or_else(|| format!("#{}", s.id))
            });
            format!("chat {} <{sender}> {}", p.chat_id, p.message.body().unwrap_or(""))
        }
        ServerEvent::ChatMessage(m) => m.body().unwrap_or("").to_string(),
        ServerEvent::MessageStatus(p) => format!("message {} {}", p.message_id, p.status),
        ServerEvent::JoinedChat(p) => format!("chat {}", p.chat_id),
        ServerEvent::UserJoined(u)
        | ServerEvent::TypingStart(u)
        | ServerEvent::TypingStop(u)
        | ServerEvent::UserOnline(u)
        | ServerEvent::UserOffline(u) => who(u),
        ServerEvent::UserStatusChanged(p) => format!(
            "#{} {}",
            p.user_id,
            if p.is_active { "active" } else { "inactive" }
        ),
        ServerEvent::RequestUpdate(p) => format!(
            "request {} {}",
            p.request_id,
            p.status.as_deref().unwrap_or("updated")
        ),
        ServerEvent::Notification(n) => format!(
            "{} {}",
            n.title.as_deref().unwrap_or("(untitled)"),
            n.message.as_deref().unwrap_or("")
        )
        .trim_end()
        .to_string(),
        ServerEvent::Connection(_) | ServerEvent::Error(_) | ServerEvent::Unknown(_) => {
            return None
        }
    })
}

fn print_text(entry: &LoggedMessage) {
    let time = entry.received_at.format("%H:%M:%S");
    let typed = ServerEvent::decode(&entry.envelope);
    match &typed {
        Ok(ServerEvent::Connection(status)) => {
            if status.connected {
                println!("  {} {}", style(time).dim(), style("connected").green().bold());
            } else {
                let reason = status.reason.as_deref().unwrap_or("");
                println!("  {} {} {}", style(time).dim(), style("disconnected").red().bold(), reason);
            }
        }
        Ok(ServerEvent::Error(err)) => {
            println!("  {} {} {}", style(time).dim(), style("ERROR").red().bold(), err.message);
        }
        _ => {
            let body = match typed.as_ref().ok().and_then(describe) {
                Some(summary) => super::truncate(&summary, 200),
                None => match &entry.envelope.data {
                    Value::Null => String::new(),
                    other => super::truncate(&other.to_string(), 200),
                },
            };
            let label = match &typed {
                Ok(event) => event.kind().to_string(),
                Err(_) => entry.envelope.event.clone(),
            };
            println!("  {} {} {}", style(time).dim(), style(format!("[{label}]")).cyan(), body);
        }
    }
}

/// Run the listen command.
pub async fn run(
    config: ConfigHandle,
    channel: Channel,
    chat_id: Option<ChatId>,
    request_id: Option<RequestId>,
    filter: Vec<String>,
    format: OutputFormat,
) -> MpResult<()> {
    let cfg = config.read().await.clone();
    cfg.validate()?;
    if chat_id.is_some() && channel != Channel::Chats {
        warn!("--chat-id ignored on the {channel} channel");
    }
    if request_id.is_some() && channel != Channel::Requests {
        warn!("--request-id ignored on the {channel} channel");
    }
    for warning in filter_warnings(channel, &filter) {
        warn!("{warning}");
    }

    let registry = ChannelRegistry::from_app_config(&cfg);
    let connection = registry.get(channel)?;
    let mut rx = connection.dispatcher().subscribe_all();
    let mounted = mount(&registry, channel, chat_id)?;

    // Local typing/presence state is only meaningful inside a chat room.
    let typing = TypingIndicator::new();
    let presence = Presence::new();
    let mut typing_rx = typing.subscribe();
    let mut presence_rx = presence.subscribe();
    let bindings = match &mounted {
        Mounted::Chat(_) => {
            let mut subs = typing.bind(&connection);
            subs.extend(presence.bind(&connection));
            subs
        }
        _ => Vec::new(),
    };

    if let OutputFormat::Text = format {
        println!(
            "{} Listening on {} ({})... (Ctrl+C to stop)",
            style("[1/1]").bold().dim(),
            channel,
            channel.path()
        );
        if let Some(id) = chat_id.filter(|_| channel == Channel::Chats) {
            println!("  Chat room: {id}");
        }
        println!();
    }

    let mut received = 0usize;
    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(envelope) => {
                        received += 1;
                        on_envelope(&mounted, request_id, &envelope);
                        if !should_print(&filter, &envelope.event) {
                            continue;
                        }
                        let entry = LoggedMessage { received_at: Utc::now(), envelope };
                        match format {
                            OutputFormat::Json => {
                                println!("{}", serde_json::to_string(&entry).unwrap_or_default());
                            }
                            OutputFormat::Text => print_text(&entry),
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        println!(
                            "  {} Missed {n} events (slow consumer)",
                            style("WARN").yellow()
                        );
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            Ok(()) = typing_rx.changed() => {
                if let OutputFormat::Text = format {
                    let users = typing_rx.borrow_and_update().users.clone();
                    println!("  {} typing: {users:?}", style("~").dim());
                }
            }
            Ok(()) = presence_rx.changed() => {
                if let OutputFormat::Text = format {
                    let online = presence_rx.borrow_and_update().clone();
                    println!("  {} online: {online:?}", style("~").dim());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if let OutputFormat::Text = format {
                    println!("\n  Disconnecting...");
                }
                break;
            }
        }
    }

    info!(
        "listener stopped after {received} event(s), state {}",
        mounted.hook().state()
    );
    drop(bindings);
    drop(mounted);
    tokio::time::sleep(FLUSH_GRACE).await;
    registry.shutdown();

    if let OutputFormat::Text = format {
        println!("  {} {received} event(s) received", style("OK").green().bold());
    }
    Ok(())
}

/// Side effects driven by the stream itself.
fn on_envelope(mounted: &Mounted, request_id: Option<RequestId>, envelope: &Envelope) {
    if envelope.event != reserved_events::CONNECTION {
        return;
    }
    // Request subscriptions are per socket; repeat them after each (re)connect.
    if let (Mounted::Requests(requests), Some(id)) = (mounted, request_id) {
        if envelope.data["connected"].as_bool() == Some(true) {
            requests.subscribe_to_request(id);
        }
    }
}
