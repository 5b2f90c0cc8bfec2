use std::error::Error;
use std::sync::Arc;

use dotenvy::dotenv;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{error, info};

mod config;
mod handlers;
mod llm;
mod state;
mod studio;
mod utils;

use config::CONFIG;
use handlers::keyboards::{CallbackKind, STUDIO_CALLBACK_PREFIX};
use handlers::media::upload_file_id;
use handlers::commands;
use llm::GeminiImageClient;
use state::AppState;
use utils::logging::init_logging;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
enum Command {
    Start,
    Help,
    Pose(String),
    Lighting(String),
    Texture(String),
    Ratio(String),
    Prompt(String),
    Generate,
    Variation,
    Results,
    Remove(String),
    Export(String),
    Status,
}

type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

#[tokio::main]
async fn main() -> HandlerResult {
    dotenv().ok();
    let _guards = init_logging();

    if CONFIG.bot_token.trim().is_empty() {
        return Err("BOT_TOKEN is required".into());
    }

    let bot = Bot::new(CONFIG.bot_token.clone());
    info!("Starting Archetype Studio bot");

    let catalog = Arc::new(studio::Catalog::load_or_builtin(&CONFIG.catalog_path));
    let client = GeminiImageClient::from_config(&CONFIG);
    info!("Image synthesis via Gemini model {}", client.model());
    let state = AppState::new(catalog, Arc::new(client));

    let command_handler = dptree::entry()
        .filter_command::<Command>()
        .endpoint(handle_command);

    let message_handler = Update::filter_message()
        .branch(command_handler)
        .branch(
            dptree::filter(|msg: Message| upload_file_id(&msg).is_some())
                .endpoint(handle_upload),
        )
        .endpoint(ignore_message);

    let callback_state = state.clone();
    let callback_handler =
        Update::filter_callback_query().endpoint(move |bot: Bot, query: CallbackQuery| {
            let state = callback_state.clone();
            async move { handle_callback_query(bot, state, query).await }
        });

    let handler = dptree::entry()
        .branch(message_handler)
        .branch(callback_handler);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn optional_arg(arg: String) -> Option<String> {
    let arg = arg.trim();
    if arg.is_empty() {
        None
    } else {
        Some(arg.to_string())
    }
}

async fn handle_command(
    bot: Bot,
    state: AppState,
    message: Message,
    command: Command,
) -> HandlerResult {
    match command {
        Command::Start => commands::start_handler(bot, message).await?,
        Command::Help => commands::help_handler(bot, message).await?,
        Command::Pose(arg) => {
            commands::preset_handler(bot, state, message, CallbackKind::Pose, optional_arg(arg))
                .await?
        }
        Command::Lighting(arg) => {
            commands::preset_handler(bot, state, message, CallbackKind::Lighting, optional_arg(arg))
                .await?
        }
        Command::Texture(arg) => {
            commands::preset_handler(bot, state, message, CallbackKind::Texture, optional_arg(arg))
                .await?
        }
        Command::Ratio(arg) => {
            commands::preset_handler(bot, state, message, CallbackKind::Ratio, optional_arg(arg))
                .await?
        }
        Command::Prompt(text) => commands::prompt_handler(bot, state, message, text).await?,
        Command::Generate => spawn_generation(bot, state, message, false),
        Command::Variation => spawn_generation(bot, state, message, true),
        Command::Results => commands::results_handler(bot, state, message).await?,
        Command::Remove(arg) => commands::remove_handler(bot, state, message, arg).await?,
        Command::Export(arg) => {
            tokio::spawn(async move {
                if let Err(err) = commands::export_handler(bot, state, message, arg).await {
                    error!("export handler failed: {err}");
                }
            });
        }
        Command::Status => commands::status_handler(bot, state, message).await?,
    }
    Ok(())
}

fn spawn_generation(bot: Bot, state: AppState, message: Message, variation: bool) {
    tokio::spawn(async move {
        if let Err(err) = commands::generation_handler(bot, state, message, variation).await {
            error!("generation handler failed: {err}");
        }
    });
}

async fn handle_upload(bot: Bot, state: AppState, message: Message) -> HandlerResult {
    tokio::spawn(async move {
        if let Err(err) = commands::upload_handler(bot, state, message).await {
            error!("upload handler failed: {err}");
        }
    });
    Ok(())
}

async fn handle_callback_query(bot: Bot, state: AppState, query: CallbackQuery) -> HandlerResult {
    let is_studio = query
        .data
        .as_deref()
        .is_some_and(|data| data.starts_with(STUDIO_CALLBACK_PREFIX));
    if !is_studio {
        let _ = bot.answer_callback_query(query.id.clone()).await;
        return Ok(());
    }
    tokio::spawn(async move {
        if let Err(err) = commands::studio_callback(bot, state, query).await {
            error!("studio callback failed: {err}");
        }
    });
    Ok(())
}

async fn ignore_message(_message: Message) -> HandlerResult {
    Ok(())
}
