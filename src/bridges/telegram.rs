//! Telegram chat transport (spec §4.4 "Telegram as the concrete chat
//! bridge"): implements `ChatTransport` over `teloxide::Bot`'s long-poll
//! `getUpdates`, grounded in the teacher's offset-tracked poll loop.

use std::sync::Mutex;

use async_trait::async_trait;
use teloxide::payloads::GetUpdatesSetters;
use teloxide::prelude::*;
use teloxide::types::{ChatId, UpdateKind};

use crate::bridges::chat::{ChatTransport, IncomingMessage};
use crate::error::{Error, Result};

/// Long-poll transport over the Telegram Bot API. Only chats in `allow_from`
/// (when non-empty) are accepted; others are silently dropped.
pub struct TelegramTransport {
    bot: Bot,
    allow_from: Vec<i64>,
    offset: Mutex<i32>,
}

impl TelegramTransport {
    pub fn new(bot_token: &str, allow_from: Vec<i64>) -> Self {
        TelegramTransport {
            bot: Bot::new(bot_token),
            allow_from,
            offset: Mutex::new(0),
        }
    }

    fn is_allowed(&self, chat_id: i64) -> bool {
        self.allow_from.is_empty() || self.allow_from.contains(&chat_id)
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn receive_next(&self) -> Result<Option<IncomingMessage>> {
        let offset = *self.offset.lock().unwrap();
        let updates = self
            .bot
            .get_updates()
            .offset(offset)
            .timeout(30)
            .await
            .map_err(|e| Error::Telegram(e.to_string()))?;

        for update in updates {
            *self.offset.lock().unwrap() = (update.id.0 as i32).saturating_add(1);

            if let UpdateKind::Message(msg) = update.kind {
                let chat_id = msg.chat.id.0;
                if !self.is_allowed(chat_id) {
                    continue;
                }
                if let Some(text) = msg.text() {
                    return Ok(Some(IncomingMessage {
                        sender: chat_id.to_string(),
                        chat_id,
                        text: text.to_string(),
                    }));
                }
            }
        }

        Ok(None)
    }

    async fn send(&self, chat_id: i64, text: &str) -> Result<()> {
        const MAX_LENGTH: usize = 4096;
        let chars: Vec<char> = text.chars().collect();
        if chars.len() <= MAX_LENGTH {
            self.bot
                .send_message(ChatId(chat_id), text)
                .await
                .map_err(|e| Error::Telegram(e.to_string()))?;
            return Ok(());
        }

        for chunk in chars.chunks(MAX_LENGTH) {
            let part: String = chunk.iter().collect();
            self.bot
                .send_message(ChatId(chat_id), part)
                .await
                .map_err(|e| Error::Telegram(e.to_string()))?;
        }
        Ok(())
    }
}
