use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::studio::{AspectRatio, PresetOption};

pub const STUDIO_CALLBACK_PREFIX: &str = "studio:";
/// Variation callbacks always re-run the session's current selection.
const CURRENT_SETUP_ID: &str = "current";
const ACTIVE_MARKER: &str = "• ";
const PRESET_ROW_WIDTH: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    Pose,
    Lighting,
    Texture,
    Ratio,
    Variation,
    Export,
    Remove,
}

impl CallbackKind {
    const ALL: [CallbackKind; 7] = [
        CallbackKind::Pose,
        CallbackKind::Lighting,
        CallbackKind::Texture,
        CallbackKind::Ratio,
        CallbackKind::Variation,
        CallbackKind::Export,
        CallbackKind::Remove,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            CallbackKind::Pose => "pose",
            CallbackKind::Lighting => "lighting",
            CallbackKind::Texture => "texture",
            CallbackKind::Ratio => "ratio",
            CallbackKind::Variation => "variation",
            CallbackKind::Export => "export",
            CallbackKind::Remove => "remove",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudioCallback {
    pub kind: CallbackKind,
    pub id: String,
}

pub fn callback_data(kind: CallbackKind, id: &str) -> String {
    format!("{STUDIO_CALLBACK_PREFIX}{}:{id}", kind.as_str())
}

/// Parses `studio:<kind>:<id>`. Ids may themselves contain `:` (ratio tokens).
pub fn parse_callback(data: &str) -> Option<StudioCallback> {
    let payload = data.strip_prefix(STUDIO_CALLBACK_PREFIX)?;
    let (kind, id) = payload.split_once(':')?;
    let kind = CallbackKind::parse(kind)?;
    if id.is_empty() {
        return None;
    }
    Some(StudioCallback {
        kind,
        id: id.to_string(),
    })
}

fn button_label(label: &str, active: bool) -> String {
    if active {
        format!("{ACTIVE_MARKER}{label}")
    } else {
        label.to_string()
    }
}

pub fn build_preset_keyboard(
    kind: CallbackKind,
    options: &[PresetOption],
    active_id: Option<&str>,
) -> InlineKeyboardMarkup {
    let buttons = options
        .iter()
        .map(|option| {
            InlineKeyboardButton::callback(
                button_label(&option.label, active_id == Some(option.id.as_str())),
                callback_data(kind, &option.id),
            )
        })
        .collect::<Vec<_>>();

    let rows = buttons
        .chunks(PRESET_ROW_WIDTH)
        .map(|chunk| chunk.to_vec())
        .collect::<Vec<_>>();
    InlineKeyboardMarkup::new(rows)
}

pub fn build_ratio_keyboard(ratios: &[AspectRatio], active: AspectRatio) -> InlineKeyboardMarkup {
    let row = ratios
        .iter()
        .map(|ratio| {
            InlineKeyboardButton::callback(
                button_label(&format!("{} {}", ratio.label(), ratio.as_str()), *ratio == active),
                callback_data(CallbackKind::Ratio, ratio.as_str()),
            )
        })
        .collect::<Vec<_>>();
    InlineKeyboardMarkup::new(vec![row])
}

pub fn build_result_keyboard(result_id: i64) -> InlineKeyboardMarkup {
    let id = result_id.to_string();
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback(
            "Variation",
            callback_data(CallbackKind::Variation, CURRENT_SETUP_ID),
        ),
        InlineKeyboardButton::callback("Export", callback_data(CallbackKind::Export, &id)),
        InlineKeyboardButton::callback("Remove", callback_data(CallbackKind::Remove, &id)),
    ]])
}
