use std::future::Future;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use teloxide::types::Message;
use tracing::info;

pub const TIMING_TARGET: &str = "studio.timing";

/// One command's timing record. `finish` consumes it, so each command logs a
/// single completion event.
#[derive(Debug)]
pub struct CommandTimer {
    command: &'static str,
    chat_id: i64,
    user_id: Option<u64>,
    message_id: i32,
    started_at: DateTime<Utc>,
    started_perf: Instant,
}

impl CommandTimer {
    pub fn start(command: &'static str, message: &Message) -> Self {
        let timer = CommandTimer {
            command,
            chat_id: message.chat.id.0,
            user_id: message.from.as_ref().map(|user| user.id.0),
            message_id: message.id.0,
            started_at: Utc::now(),
            started_perf: Instant::now(),
        };
        info!(
            target: TIMING_TARGET,
            event = "command_received",
            command = timer.command,
            chat_id = timer.chat_id,
            user_id = ?timer.user_id,
            message_id = timer.message_id,
            received_at = %timer.started_at.to_rfc3339()
        );
        timer
    }

    pub fn finish(self, status: &str, detail: Option<String>) {
        info!(
            target: TIMING_TARGET,
            event = "command_completed",
            command = self.command,
            chat_id = self.chat_id,
            user_id = ?self.user_id,
            message_id = self.message_id,
            started_at = %self.started_at.to_rfc3339(),
            duration_s = self.started_perf.elapsed().as_secs_f64(),
            status,
            detail = detail.as_deref().unwrap_or("")
        );
    }
}

/// Times one outbound model call and logs request and response events around it.
pub async fn log_llm_timing<T, E, F, Fut>(
    provider: &str,
    model: &str,
    operation: &str,
    metadata: Option<JsonValue>,
    call: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let metadata = metadata.unwrap_or_else(|| JsonValue::Object(Default::default()));
    let started_perf = Instant::now();
    info!(
        target: TIMING_TARGET,
        event = "llm_request",
        provider,
        model,
        operation,
        started_at = %Utc::now().to_rfc3339(),
        metadata = %metadata
    );

    let result = call().await;

    info!(
        target: TIMING_TARGET,
        event = "llm_response",
        provider,
        model,
        operation,
        duration_s = started_perf.elapsed().as_secs_f64(),
        status = if result.is_ok() { "success" } else { "error" },
        metadata = %metadata
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn llm_timing_passes_result_through() {
        let ok: Result<u8, String> =
            log_llm_timing("gemini", "m", "op", None, || async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));

        let err: Result<u8, String> = log_llm_timing("gemini", "m", "op", None, || async {
            Err("boom".to_string())
        })
        .await;
        assert_eq!(err, Err("boom".to_string()));
    }
}
