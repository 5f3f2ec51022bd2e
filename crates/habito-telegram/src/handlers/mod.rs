//! Telegram update handlers.
//!
//! Each inbound message is one unit of work: resolve the sender, parse the
//! text into a `Command`, call the store, render the reply. Per-user
//! serialization lives inside the store, so handlers stay lock-free.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

mod commands;
mod text;

use crate::router::AppState;

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(body) = msg.text() else {
        return Ok(());
    };

    if body.trim_start().starts_with('/') {
        return commands::handle_command(msg, state).await;
    }

    text::handle_text(msg, state).await
}
