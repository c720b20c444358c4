use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use uuid::Uuid;

use gigdesk_api::{ApiConfig, HttpClient};
use gigdesk_chat::{ConversationSession, SessionContext, SessionUpdate};
use gigdesk_hub::WebSocketConnector;
use gigdesk_types::models::Message;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gigdesk=debug".into()),
        )
        .init();

    // Config
    let config = ApiConfig::from_env()?;
    let chat_id: Uuid = std::env::var("GIGDESK_CHAT_ID")
        .context("GIGDESK_CHAT_ID is not set")?
        .parse()
        .context("GIGDESK_CHAT_ID is not a valid id")?;

    let client = HttpClient::new(&config)?;
    let connector = WebSocketConnector::new(config.hub_url.clone(), config.token.clone());

    let session = ConversationSession::open(
        SessionContext::new(chat_id, config.user_id),
        Arc::new(client),
        Arc::new(connector),
    )
    .await?;

    let order = session.order();
    info!(
        "chat {} / order \"{}\": {:?}, {:?} as {:?}, deadline: {}",
        chat_id,
        order.title,
        order.status,
        session.payment_status(),
        session.role(),
        session.time_left(chrono::Utc::now())
    );

    let mut printed = HashSet::new();
    print_new(&session.messages(), &mut printed);

    loop {
        tokio::select! {
            update = session.next_update() => match update {
                SessionUpdate::MessagesChanged => print_new(&session.messages(), &mut printed),
                SessionUpdate::Typing(true) => info!("собеседник печатает..."),
                SessionUpdate::Typing(false) => {}
                SessionUpdate::Connection(state) => info!("connection: {:?}", state),
                SessionUpdate::Error(e) => {
                    warn!("{}", e);
                    session.dismiss_error();
                }
                SessionUpdate::Closed => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    session.close();
    Ok(())
}

fn print_new(messages: &[Message], printed: &mut HashSet<Uuid>) {
    for message in messages {
        if !printed.insert(message.id) {
            continue;
        }
        let text = message.content.as_deref().unwrap_or("");
        let attachment = match (&message.attachment_url, message.is_voice) {
            (Some(_), true) => " [voice]",
            (Some(_), false) => " [file]",
            (None, _) => "",
        };
        let edited = if message.is_edited { " (ред.)" } else { "" };
        println!(
            "{} {}: {}{}{}",
            message.sent_at.format("%d.%m %H:%M"),
            message.sender_id,
            text,
            attachment,
            edited
        );
    }
}
