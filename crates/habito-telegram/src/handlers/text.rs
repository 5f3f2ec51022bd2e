use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use habito_core::domain::ChatId;

use crate::router::AppState;

const HINT: &str =
    "Solo entiendo comandos. Escribe /help para ver lo que puedo hacer por tus hábitos.";

pub async fn handle_text(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    if msg.from().is_none() {
        return Ok(());
    }

    let chat_id = ChatId(msg.chat.id.0);
    if let Err(e) = state.messenger.send_html(chat_id, HINT).await {
        tracing::error!(chat_id = chat_id.0, error = %e, "reply failed");
    }
    Ok(())
}
