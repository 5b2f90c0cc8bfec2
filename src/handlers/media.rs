use anyhow::{anyhow, Result};
use teloxide::prelude::*;
use teloxide::types::FileId;

use crate::config::CONFIG;
use crate::llm::media::download_image_asset;
use crate::studio::{ImageAsset, ImageSlot};

fn is_image_mime(mime: &str) -> bool {
    mime.trim().to_ascii_lowercase().starts_with("image/")
}

/// The largest photo size, or an image sent as a document.
pub fn upload_file_id(message: &Message) -> Option<FileId> {
    if let Some(photo) = message.photo().and_then(|sizes| sizes.last()) {
        return Some(photo.file.id.clone());
    }
    message
        .document()
        .filter(|doc| {
            doc.mime_type
                .as_ref()
                .is_some_and(|mime| is_image_mime(mime.essence_str()))
        })
        .map(|doc| doc.file.id.clone())
}

pub fn upload_slot(message: &Message) -> Option<ImageSlot> {
    message.caption().and_then(ImageSlot::parse)
}

pub async fn get_file_url(bot: &Bot, file_id: &FileId) -> Result<String> {
    let file = bot.get_file(file_id.clone()).await?;
    Ok(format!(
        "https://api.telegram.org/file/bot{}/{}",
        CONFIG.bot_token, file.path
    ))
}

pub async fn fetch_upload(bot: &Bot, file_id: &FileId) -> Result<ImageAsset> {
    let url = get_file_url(bot, file_id).await?;
    download_image_asset(&url)
        .await
        .map_err(|err| anyhow!("could not read the uploaded image: {err}"))
}
