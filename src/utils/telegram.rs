use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ChatAction;
use tokio::task::JoinHandle;
use tracing::debug;

// Telegram clears a chat action after roughly five seconds.
const REFRESH_INTERVAL: Duration = Duration::from_secs(4);

/// Keeps a chat action ("uploading photo…") visible until dropped.
pub struct ChatActionHeartbeat {
    task: JoinHandle<()>,
}

impl ChatActionHeartbeat {
    pub fn start(bot: Bot, chat_id: ChatId, action: ChatAction) -> Self {
        let task = tokio::spawn(async move {
            loop {
                if let Err(err) = bot.send_chat_action(chat_id, action.clone()).await {
                    debug!(chat_id = chat_id.0, "chat action refresh failed: {err}");
                }
                tokio::time::sleep(REFRESH_INTERVAL).await;
            }
        });
        ChatActionHeartbeat { task }
    }
}

impl Drop for ChatActionHeartbeat {
    fn drop(&mut self) {
        self.task.abort();
    }
}
