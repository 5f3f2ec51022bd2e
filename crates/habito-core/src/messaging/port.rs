use async_trait::async_trait;

use crate::{domain::ChatId, Result};

/// Capabilities of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub supports_html: bool,
    pub max_message_len: usize,
}

/// Hexagonal port for delivering outbound text.
///
/// Telegram is the first implementation; the shape leaves room for other
/// messengers behind capability flags.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<()>;
}
