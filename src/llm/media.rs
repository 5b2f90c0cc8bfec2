use std::time::Duration;

use reqwest::StatusCode;
use tracing::warn;

use crate::studio::selection::{ImageAsset, ReadError};
use crate::utils::http::get_http_client;

const MEDIA_DOWNLOAD_MAX_ATTEMPTS: usize = 3;
const MEDIA_DOWNLOAD_BASE_DELAY_MS: u64 = 400;
const MEDIA_DOWNLOAD_ERROR_BODY_LIMIT: usize = 800;

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn should_retry_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn retry_delay(attempt: usize) -> Duration {
    Duration::from_millis(MEDIA_DOWNLOAD_BASE_DELAY_MS << attempt)
}

/// Fetches an uploaded reference photo. Retries apply to reading the user's
/// file only; generation calls are never retried.
pub async fn download_image_asset(url: &str) -> Result<ImageAsset, ReadError> {
    let client = get_http_client();
    let mut last_error = String::from("no attempt made");

    for attempt in 0..MEDIA_DOWNLOAD_MAX_ATTEMPTS {
        let is_last = attempt + 1 == MEDIA_DOWNLOAD_MAX_ATTEMPTS;
        let response = match client.get(url).send().await {
            Ok(resp) => resp,
            Err(err) => {
                let retry = should_retry_error(&err) && !is_last;
                // File URLs embed the bot token.
                let err = err.without_url();
                warn!(
                    "Failed to fetch upload: {err} (timeout={}, connect={}, attempt={}/{})",
                    err.is_timeout(),
                    err.is_connect(),
                    attempt + 1,
                    MEDIA_DOWNLOAD_MAX_ATTEMPTS
                );
                last_error = err.to_string();
                if !retry {
                    break;
                }
                tokio::time::sleep(retry_delay(attempt)).await;
                continue;
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                "Upload download failed with status {}: {}",
                status,
                truncate_for_log(&body, MEDIA_DOWNLOAD_ERROR_BODY_LIMIT)
            );
            last_error = format!("download failed with status {status}");
            if !should_retry_status(status) || is_last {
                break;
            }
            tokio::time::sleep(retry_delay(attempt)).await;
            continue;
        }

        match response.bytes().await {
            Ok(bytes) => return ImageAsset::from_bytes(bytes.to_vec()),
            Err(err) => {
                let err = err.without_url();
                warn!(
                    "Failed to read upload bytes: {err} (attempt={}/{})",
                    attempt + 1,
                    MEDIA_DOWNLOAD_MAX_ATTEMPTS
                );
                last_error = err.to_string();
                if is_last {
                    break;
                }
                tokio::time::sleep(retry_delay(attempt)).await;
            }
        }
    }

    Err(ReadError::Io(last_error))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_only_transient_statuses() {
        assert!(should_retry_status(StatusCode::BAD_GATEWAY));
        assert!(should_retry_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!should_retry_status(StatusCode::NOT_FOUND));
    }

    #[test]
    fn delay_doubles_per_attempt() {
        assert_eq!(retry_delay(0), Duration::from_millis(400));
        assert_eq!(retry_delay(2), Duration::from_millis(1600));
    }
}
