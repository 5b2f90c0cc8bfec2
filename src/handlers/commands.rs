use anyhow::Result;
use chrono::Utc;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, InlineKeyboardMarkup, InputFile, MessageId, ReplyParameters};
use tracing::{error, warn};

use crate::config::CONFIG;
use crate::handlers::keyboards::{
    build_preset_keyboard, build_ratio_keyboard, build_result_keyboard, parse_callback,
    CallbackKind,
};
use crate::handlers::media::{fetch_upload, upload_file_id, upload_slot};
use crate::state::AppState;
use crate::studio::prompt::SYSTEM_PREAMBLE;
use crate::studio::{AspectRatio, GenerationResult, ImageSlot, PresetOption, StudioSession};
use crate::utils::telegram::ChatActionHeartbeat;
use crate::utils::timing::CommandTimer;

const CAPTION_LIMIT: usize = 1000;
const MESSAGE_LIMIT: usize = 3900;
const RESULT_LIST_PREVIEW: usize = 80;

const HELP_TEXT: &str = "Archetype Studio

Send photos with a caption to fill the reference slots:
  identity - the face to keep
  outfit - the garment to wear
  product - optional item to feature

/pose [id] - pick a photographic style (again to clear)
/lighting [id] - pick the lighting
/texture [id] - pick the skin texture
/ratio [1:1|9:16|16:9|4:3] - pick the frame
/prompt <text> - add creative direction (empty clears)
/generate - synthesize a new image
/variation - re-run the current setup with a random variation
  (the Variation button under a result does the same)
/results - list generated images
/export <id> - download an image
/remove <id> - drop an image
/status - show the current setup";

fn truncate_chars(text: &str, max_chars: usize) -> (String, bool) {
    let mut iter = text.chars();
    let truncated: String = iter.by_ref().take(max_chars).collect();
    let was_truncated = iter.next().is_some();
    (truncated, was_truncated)
}

fn preview(text: &str, max_chars: usize) -> String {
    match truncate_chars(text, max_chars) {
        (truncated, true) => format!("{}…", truncated.trim_end()),
        (full, false) => full,
    }
}

/// The creative part of a stored prompt, without the fixed preamble.
fn prompt_body(result: &GenerationResult) -> &str {
    let prompt = result.prompt();
    prompt.strip_prefix(SYSTEM_PREAMBLE).unwrap_or(prompt).trim()
}

fn result_caption(result: &GenerationResult, preview_chars: usize) -> String {
    let header = format!("Result #{}", result.id());
    let budget = preview_chars.min(CAPTION_LIMIT.saturating_sub(header.len() + 2));
    if budget == 0 {
        return header;
    }
    format!("{header}\n\n{}", preview(prompt_body(result), budget))
}

fn parse_result_id(arg: &str) -> Option<i64> {
    arg.trim().trim_start_matches('#').parse::<i64>().ok()
}

fn unknown_option(kind: &str, id: &str, options: &[PresetOption]) -> String {
    let available = options
        .iter()
        .map(|option| option.id.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!("Unknown {kind} '{id}'. Available: {available}")
}

/// Applies a preset choice to the session and returns the confirmation text.
fn apply_preset(session: &mut StudioSession, kind: CallbackKind, id: &str) -> Result<String, String> {
    let id = id.trim();
    match kind {
        CallbackKind::Pose => {
            let Some(pose) = session.catalog().pose(id).cloned() else {
                return Err(unknown_option("pose", id, session.catalog().poses()));
            };
            session.selection_mut().toggle_pose(&pose);
            Ok(match session.selection().pose() {
                Some(active) => format!("Pose set to {}.", active.label),
                None => "Pose cleared.".to_string(),
            })
        }
        CallbackKind::Lighting => {
            let Some(lighting) = session.catalog().lighting_preset(id).cloned() else {
                return Err(unknown_option("lighting", id, session.catalog().lighting()));
            };
            session.selection_mut().select_lighting(&lighting);
            Ok(format!("Lighting set to {}.", lighting.label))
        }
        CallbackKind::Texture => {
            let Some(texture) = session.catalog().skin_texture(id).cloned() else {
                return Err(unknown_option(
                    "skin texture",
                    id,
                    session.catalog().skin_textures(),
                ));
            };
            session.selection_mut().select_skin_texture(&texture);
            Ok(format!("Skin texture set to {}.", texture.label))
        }
        CallbackKind::Ratio => {
            let Some(ratio) = AspectRatio::parse(id) else {
                let available = session
                    .catalog()
                    .aspect_ratios()
                    .iter()
                    .map(|ratio| ratio.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(format!("Unknown aspect ratio '{id}'. Available: {available}"));
            };
            session.selection_mut().select_aspect_ratio(ratio);
            Ok(format!(
                "Aspect ratio set to {} ({}).",
                ratio.label(),
                ratio.as_str()
            ))
        }
        CallbackKind::Variation | CallbackKind::Export | CallbackKind::Remove => {
            Err(format!("'{}' is not a preset.", kind.as_str()))
        }
    }
}

fn preset_menu(session: &StudioSession, kind: CallbackKind) -> Option<(String, InlineKeyboardMarkup)> {
    let catalog = session.catalog();
    let selection = session.selection();
    let menu = match kind {
        CallbackKind::Pose => (
            "Choose a pose style (tap the active one to clear it):",
            build_preset_keyboard(kind, catalog.poses(), selection.pose().map(|p| p.id.as_str())),
        ),
        CallbackKind::Lighting => (
            "Choose the lighting:",
            build_preset_keyboard(kind, catalog.lighting(), Some(selection.lighting().id.as_str())),
        ),
        CallbackKind::Texture => (
            "Choose the skin texture:",
            build_preset_keyboard(
                kind,
                catalog.skin_textures(),
                Some(selection.skin_texture().id.as_str()),
            ),
        ),
        CallbackKind::Ratio => (
            "Choose the aspect ratio:",
            build_ratio_keyboard(catalog.aspect_ratios(), selection.aspect_ratio()),
        ),
        CallbackKind::Variation | CallbackKind::Export | CallbackKind::Remove => return None,
    };
    Some((menu.0.to_string(), menu.1))
}

fn slot_status(session: &StudioSession, slot: ImageSlot, missing: &str) -> String {
    match session.selection().image(slot) {
        Some(asset) => format!("ready ({} bytes)", asset.bytes().len()),
        None => missing.to_string(),
    }
}

fn build_status_report(session: &StudioSession, model: &str) -> String {
    let selection = session.selection();
    let directive = selection.directive().trim();
    let state = session.state();
    let mut lines = vec![
        "Studio status".to_string(),
        format!("Identity: {}", slot_status(session, ImageSlot::Identity, "missing")),
        format!("Outfit: {}", slot_status(session, ImageSlot::Outfit, "missing")),
        format!("Product: {}", slot_status(session, ImageSlot::Product, "none")),
        format!(
            "Pose: {}",
            selection.pose().map(|pose| pose.label.as_str()).unwrap_or("none")
        ),
        format!("Lighting: {}", selection.lighting().label),
        format!("Skin texture: {}", selection.skin_texture().label),
        format!(
            "Aspect ratio: {} ({})",
            selection.aspect_ratio().label(),
            selection.aspect_ratio().as_str()
        ),
        format!(
            "Direction: {}",
            if directive.is_empty() { "(none)" } else { directive }
        ),
    ];
    match state.error_message() {
        Some(message) => lines.push(format!("Generation: {} ({message})", state.label())),
        None => lines.push(format!("Generation: {}", state.label())),
    }
    lines.push(format!("Results: {}", session.results().len()));
    lines.push(format!(
        "Variation: {}",
        if session.can_generate_variation() { "available" } else { "unavailable" }
    ));
    lines.push(format!("Model: {model}"));
    lines.join("\n")
}

fn build_results_list(session: &StudioSession) -> String {
    if session.results().is_empty() {
        return "No results yet. Use /generate once identity and outfit are set.".to_string();
    }
    let mut lines = vec!["Results (newest first):".to_string()];
    lines.extend(session.results().iter().map(|result| {
        format!(
            "#{} at {} - {}",
            result.id(),
            result.created_at().format("%H:%M:%S"),
            preview(prompt_body(result), RESULT_LIST_PREVIEW)
        )
    }));
    preview(&lines.join("\n"), MESSAGE_LIMIT)
}

async fn reply(bot: &Bot, message: &Message, text: impl Into<String>) -> Result<()> {
    bot.send_message(message.chat.id, text.into())
        .reply_parameters(ReplyParameters::new(message.id))
        .await?;
    Ok(())
}

pub async fn start_handler(bot: Bot, message: Message) -> Result<()> {
    reply(
        &bot,
        &message,
        "Welcome to Archetype Studio. Send an identity photo and an outfit photo, then /generate. Use /help for everything else.",
    )
    .await
}

pub async fn help_handler(bot: Bot, message: Message) -> Result<()> {
    reply(&bot, &message, HELP_TEXT).await
}

pub async fn preset_handler(
    bot: Bot,
    state: AppState,
    message: Message,
    kind: CallbackKind,
    arg: Option<String>,
) -> Result<()> {
    let chat_id = message.chat.id;
    let Some(id) = arg else {
        let Some((title, markup)) = state.with_session(chat_id.0, |session| preset_menu(session, kind))
        else {
            return Ok(());
        };
        bot.send_message(chat_id, title)
            .reply_parameters(ReplyParameters::new(message.id))
            .reply_markup(markup)
            .await?;
        return Ok(());
    };

    let text = match state.with_session(chat_id.0, |session| apply_preset(session, kind, &id)) {
        Ok(text) | Err(text) => text,
    };
    reply(&bot, &message, text).await
}

pub async fn prompt_handler(bot: Bot, state: AppState, message: Message, text: String) -> Result<()> {
    let text = text.trim().to_string();
    let cleared = text.is_empty();
    state.with_session(message.chat.id.0, |session| {
        session.selection_mut().set_directive(text)
    });
    let confirmation = if cleared {
        "Creative direction cleared."
    } else {
        "Creative direction updated."
    };
    reply(&bot, &message, confirmation).await
}

pub async fn upload_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let Some(file_id) = upload_file_id(&message) else {
        return Ok(());
    };
    let Some(slot) = upload_slot(&message) else {
        return reply(
            &bot,
            &message,
            "Caption the photo with identity, outfit or product so I know where it goes.",
        )
        .await;
    };

    let timer = CommandTimer::start("upload", &message);
    match fetch_upload(&bot, &file_id).await {
        Ok(asset) => {
            state.with_session(message.chat.id.0, |session| {
                session.selection_mut().set_image(slot, asset)
            });
            timer.finish("success", Some(slot.label().to_lowercase()));
            reply(&bot, &message, format!("{} reference stored.", slot.label())).await
        }
        Err(err) => {
            warn!("upload for {} slot failed: {err}", slot.label());
            timer.finish("error", Some(err.to_string()));
            reply(
                &bot,
                &message,
                format!("{} reference not stored: {err}", slot.label()),
            )
            .await
        }
    }
}

/// Runs one generation for the chat. The session lock is taken to begin and
/// again to complete, never across the outbound call.
pub async fn generation_handler(
    bot: Bot,
    state: AppState,
    message: Message,
    variation: bool,
) -> Result<()> {
    let chat_id = message.chat.id;
    let command = if variation { "variation" } else { "generate" };
    let timer = CommandTimer::start(command, &message);

    let begun = state.with_session(chat_id.0, |session| {
        if variation {
            session.begin_variation(&mut rand::thread_rng())
        } else {
            session.begin_submit()
        }
    });
    let pending = match begun {
        Ok(pending) => pending,
        Err(err) => {
            timer.finish("rejected", Some(err.to_string()));
            return reply(&bot, &message, err.to_string()).await;
        }
    };

    let outcome = {
        let _heartbeat = ChatActionHeartbeat::start(bot.clone(), chat_id, ChatAction::UploadPhoto);
        state.synthesizer.synthesize(&pending.request).await
    };
    let pending_variation = pending.variation.clone();
    let completed =
        state.with_session(chat_id.0, |session| session.complete(pending, outcome, Utc::now()));

    match completed {
        Ok(result) => {
            let detail = match pending_variation.as_deref() {
                Some(modifier) => format!("result_id={} variation={modifier}", result.id()),
                None => format!("result_id={}", result.id()),
            };
            timer.finish("success", Some(detail));
            send_result(&bot, &message, &result).await
        }
        Err(err) => {
            timer.finish("error", Some(err.to_string()));
            reply(&bot, &message, format!("Generation failed: {err}")).await
        }
    }
}

async fn send_result(bot: &Bot, message: &Message, result: &GenerationResult) -> Result<()> {
    let photo = InputFile::memory(result.image().bytes.clone()).file_name(result.export_file_name());
    bot.send_photo(message.chat.id, photo)
        .caption(result_caption(result, CONFIG.caption_prompt_preview))
        .reply_markup(build_result_keyboard(result.id()))
        .reply_parameters(ReplyParameters::new(message.id))
        .await?;
    Ok(())
}

pub async fn results_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let text = state.with_session(message.chat.id.0, |session| build_results_list(session));
    reply(&bot, &message, text).await
}

fn remove_result(state: &AppState, chat_id: ChatId, id: i64) -> String {
    if state.with_session(chat_id.0, |session| session.remove_result(id)) {
        format!("Result #{id} removed.")
    } else {
        format!("No result #{id} in this studio.")
    }
}

pub async fn remove_handler(bot: Bot, state: AppState, message: Message, arg: String) -> Result<()> {
    let Some(id) = parse_result_id(&arg) else {
        return reply(&bot, &message, "Usage: /remove <id> (see /results)").await;
    };
    let text = remove_result(&state, message.chat.id, id);
    reply(&bot, &message, text).await
}

async fn send_export(
    bot: &Bot,
    state: &AppState,
    chat_id: ChatId,
    reply_to: MessageId,
    id: i64,
) -> Result<()> {
    let Some(result) = state.with_session(chat_id.0, |session| session.result(id).cloned()) else {
        bot.send_message(chat_id, format!("No result #{id} in this studio."))
            .reply_parameters(ReplyParameters::new(reply_to))
            .await?;
        return Ok(());
    };

    let document = InputFile::memory(result.image().bytes.clone()).file_name(result.export_file_name());
    bot.send_document(chat_id, document)
        .caption(format!("Result #{}", result.id()))
        .reply_parameters(ReplyParameters::new(reply_to))
        .await?;
    Ok(())
}

pub async fn export_handler(bot: Bot, state: AppState, message: Message, arg: String) -> Result<()> {
    let Some(id) = parse_result_id(&arg) else {
        return reply(&bot, &message, "Usage: /export <id> (see /results)").await;
    };
    let timer = CommandTimer::start("export", &message);
    let sent = send_export(&bot, &state, message.chat.id, message.id, id).await;
    let status = if sent.is_ok() { "success" } else { "error" };
    timer.finish(status, Some(format!("result_id={id}")));
    sent
}

pub async fn status_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let report = state.with_session(message.chat.id.0, |session| {
        build_status_report(session, &CONFIG.gemini_image_model)
    });
    let report = format!("{report}\nActive studios: {}", state.session_count());
    reply(&bot, &message, report).await
}

pub async fn studio_callback(bot: Bot, state: AppState, query: CallbackQuery) -> Result<()> {
    let parsed = query.data.as_deref().and_then(parse_callback);
    let (Some(callback), Some(message)) = (parsed, query.regular_message().cloned()) else {
        let _ = bot.answer_callback_query(query.id.clone()).await;
        return Ok(());
    };
    let chat_id = message.chat.id;

    match callback.kind {
        CallbackKind::Variation => {
            // Always the current setup; the button does not target its result.
            let _ = bot.answer_callback_query(query.id.clone()).await;
            tokio::spawn(async move {
                if let Err(err) = generation_handler(bot, state, message, true).await {
                    error!("variation callback failed: {err}");
                }
            });
        }
        CallbackKind::Export => {
            let _ = bot.answer_callback_query(query.id.clone()).await;
            if let Some(id) = parse_result_id(&callback.id) {
                send_export(&bot, &state, chat_id, message.id, id).await?;
            }
        }
        CallbackKind::Remove => {
            let text = match parse_result_id(&callback.id) {
                Some(id) => remove_result(&state, chat_id, id),
                None => "No such result.".to_string(),
            };
            bot.answer_callback_query(query.id.clone()).text(text).await?;
        }
        kind => {
            let (outcome, menu) = state.with_session(chat_id.0, |session| {
                let outcome = apply_preset(session, kind, &callback.id);
                (outcome, preset_menu(session, kind))
            });
            let applied = outcome.is_ok();
            let text = match outcome {
                Ok(text) | Err(text) => text,
            };
            bot.answer_callback_query(query.id.clone()).text(text).await?;
            if let (true, Some((_, markup))) = (applied, menu) {
                if let Err(err) = bot
                    .edit_message_reply_markup(chat_id, message.id)
                    .reply_markup(markup)
                    .await
                {
                    warn!("failed to refresh {} keyboard: {err}", kind.as_str());
                }
            }
        }
    }
    Ok(())
}
