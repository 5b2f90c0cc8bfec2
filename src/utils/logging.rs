use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::config::CONFIG;
use crate::utils::timing::TIMING_TARGET;

const LOGS_DIR: &str = "logs";
const NOISY_TARGETS: [&str; 5] = ["hyper", "hyper_util", "reqwest", "rustls", "teloxide"];

/// Flushes the file writers when dropped; keep it alive for the whole process.
pub struct LoggingGuards {
    _guards: Vec<WorkerGuard>,
}

fn parse_log_level(value: &str) -> LevelFilter {
    match value.trim().to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" | "warning" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        "off" => LevelFilter::OFF,
        _ => LevelFilter::INFO,
    }
}

fn general_targets(level: LevelFilter) -> Targets {
    NOISY_TARGETS.iter().fold(
        Targets::new()
            .with_default(level)
            .with_target(TIMING_TARGET, LevelFilter::OFF),
        |targets, target| targets.with_target(*target, LevelFilter::WARN),
    )
}

fn timing_targets() -> Targets {
    Targets::new()
        .with_default(LevelFilter::OFF)
        .with_target(TIMING_TARGET, LevelFilter::INFO)
}

fn daily_writer(dir: &Path, file_name: &str, guards: &mut Vec<WorkerGuard>) -> NonBlocking {
    let appender = tracing_appender::rolling::daily(dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    guards.push(guard);
    writer
}

/// Installs stdout plus daily-rolling text and JSON files: `studio.*` for
/// application events, `timing.*` for the command and model timing stream.
pub fn init_logging() -> LoggingGuards {
    let logs_dir = Path::new(LOGS_DIR);
    if let Err(err) = fs::create_dir_all(logs_dir) {
        eprintln!("Failed to create logs directory: {err}");
    }

    let mut guards = Vec::with_capacity(4);
    let studio_text = daily_writer(logs_dir, "studio.log", &mut guards);
    let studio_json = daily_writer(logs_dir, "studio.jsonl", &mut guards);
    let timing_text = daily_writer(logs_dir, "timing.log", &mut guards);
    let timing_json = daily_writer(logs_dir, "timing.jsonl", &mut guards);

    let general = general_targets(parse_log_level(&CONFIG.log_level));
    let timing = timing_targets();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(general.clone()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(studio_text)
                .with_ansi(false)
                .with_filter(general.clone()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(studio_json)
                .with_filter(general),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(timing_text)
                .with_ansi(false)
                .with_filter(timing.clone()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(timing_json)
                .with_filter(timing),
        )
        .init();

    LoggingGuards { _guards: guards }
}

#[cfg(test)]
mod tests {
    use tracing::Level;

    use super::*;

    #[test]
    fn log_level_parsing_defaults_to_info() {
        assert_eq!(parse_log_level("DEBUG"), LevelFilter::DEBUG);
        assert_eq!(parse_log_level(" warning "), LevelFilter::WARN);
        assert_eq!(parse_log_level("verbose"), LevelFilter::INFO);
    }

    #[test]
    fn timing_events_stay_out_of_the_general_stream() {
        let general = general_targets(LevelFilter::DEBUG);
        assert!(!general.would_enable(TIMING_TARGET, &Level::INFO));
        assert!(general.would_enable("archetype_studio::studio", &Level::DEBUG));
        assert!(!general.would_enable("teloxide::dispatching", &Level::INFO));
        assert!(general.would_enable("reqwest::connect", &Level::WARN));

        let timing = timing_targets();
        assert!(timing.would_enable(TIMING_TARGET, &Level::INFO));
        assert!(!timing.would_enable("archetype_studio::studio", &Level::ERROR));
    }
}
