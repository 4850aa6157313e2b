//! Telegram delivery.

use crate::notifier::{Notification, NotificationSink, NotifyError};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::markdown;
use tracing::debug;

/// Label of the inline link appended to alerts.
const LINK_LABEL: &str = "Click here to view tickets";

/// Render a notification as Telegram message text.
///
/// Messages with a link use MarkdownV2, so the text and the link target are
/// escaped; prices like `£45.50` would otherwise break the markup. Plain
/// messages are sent without a parse mode and need no escaping.
pub fn render_message(notification: &Notification) -> (String, Option<ParseMode>) {
    match &notification.link {
        Some(url) => (
            format!(
                "{}\n[{}]({})",
                markdown::escape(&notification.text),
                markdown::escape(LINK_LABEL),
                markdown::escape_link_url(url)
            ),
            Some(ParseMode::MarkdownV2),
        ),
        None => (notification.text.clone(), None),
    }
}

/// Sends notifications to a single Telegram chat.
pub struct TelegramSink {
    bot: Bot,
    chat_id: ChatId,
}

impl std::fmt::Debug for TelegramSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramSink")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

impl TelegramSink {
    /// Create a sink with the given bot token and destination chat.
    pub fn new(token: &str, chat_id: i64) -> Self {
        Self {
            bot: Bot::new(token),
            chat_id: ChatId(chat_id),
        }
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotifyError> {
        let (text, parse_mode) = render_message(notification);

        let mut request = self.bot.send_message(self.chat_id, text);
        if let Some(mode) = parse_mode {
            request = request.parse_mode(mode);
        }
        request.await?;

        debug!(chat_id = self.chat_id.0, "Telegram message sent");
        Ok(())
    }
}
