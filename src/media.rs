use chrono::{DateTime, Utc};
use rocket::fs::TempFile;
use rocket::http::ContentType;
use std::io;
use std::path::Path;
use tracing::info;

pub const POST_IMAGES: &str = "posts";

/// Public URL of a stored upload.
pub fn url(relative: &str) -> String {
    format!("/media/{}", relative)
}

pub fn stored_name(name: Option<&str>, content_type: Option<&ContentType>, now: DateTime<Utc>) -> String {
    let stem = match name {
        Some(name) if !name.is_empty() => name,
        _ => "image",
    };
    match content_type.and_then(|ct| ct.extension()) {
        Some(ext) => format!("{}_{}.{}", now.timestamp_millis(), stem, ext),
        None => format!("{}_{}", now.timestamp_millis(), stem),
    }
}

/// Copies an uploaded image under `<media_root>/posts/` and returns the path
/// relative to the media root. An empty upload field stores nothing.
pub async fn store_image(file: &mut TempFile<'_>, media_root: &Path) -> io::Result<Option<String>> {
    if file.len() == 0 {
        return Ok(None);
    }
    let name = stored_name(file.name(), file.content_type(), Utc::now());
    let destination = media_root.join(POST_IMAGES).join(&name);
    file.copy_to(&destination).await?;
    info!(path = %destination.display(), bytes = file.len(), "stored post image");
    Ok(Some(format!("{}/{}", POST_IMAGES, name)))
}
