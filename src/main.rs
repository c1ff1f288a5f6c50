//! Process bootstrap: configuration, logging, and the long-poll loop.
//!
//! The poll loop processes updates strictly one at a time, which is the
//! serialization guarantee the rest of the bot relies on. Transport faults
//! never kill the process: the loop logs, sleeps briefly and reconnects.

use std::time::Duration;

use anyhow::Result;
use tracing::{error, info};

use reeldesk::config::Config;
use reeldesk::dispatch::Dispatcher;
use reeldesk::formatter::{Formatter, OpenAiFormatter};
use reeldesk::telegram::{TelegramClient, Transport};

/// Long-poll timeout handed to getUpdates.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Pause before reconnecting after a transport failure.
const RECONNECT_DELAY: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    info!(
        "starting reeldesk (staff chat {}, window {:02}:00-{:02}:00 {})",
        config.staff_chat_id, config.request_start_hour, config.request_end_hour, config.timezone
    );

    let client = TelegramClient::new(config.bot_token.clone());
    let formatter = OpenAiFormatter::new(config.openai_api_key.clone());
    let dispatcher = Dispatcher::new(&config, client.clone(), formatter);

    tokio::select! {
        _ = poll_loop(&client, &dispatcher) => {}
        _ = tokio::signal::ctrl_c() => info!("shutdown signal received"),
    }
    Ok(())
}

/// Drain the startup backlog, then poll forever, reconnecting on failure.
async fn poll_loop<T: Transport, F: Formatter>(
    client: &TelegramClient,
    dispatcher: &Dispatcher<T, F>,
) {
    let mut offset = match client.drain_backlog().await {
        Ok(next) => next,
        Err(err) => {
            error!("could not drain startup backlog: {err:#}");
            0
        }
    };

    loop {
        match client.get_updates(offset, POLL_TIMEOUT_SECS).await {
            Ok(updates) => {
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    dispatcher.handle_update(update).await;
                }
            }
            Err(err) => {
                error!("polling failed, reconnecting: {err:#}");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}
