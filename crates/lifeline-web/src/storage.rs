use axum::{
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};

use lifeline_platform::LocalPlatform;

use crate::error::ApiError;

/// Public object URLs for the embedded platform, the same shape the hosted
/// storage uses.
pub async fn public_object(
    State(platform): State<LocalPlatform>,
    Path((bucket, path)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = platform
        .storage()
        .get(&bucket, &path)
        .await?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Object not found"))?;
    Ok(([(header::CONTENT_TYPE, content_type(&path))], bytes))
}

fn content_type(path: &str) -> &'static str {
    let ext = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_from_extension() {
        assert_eq!(content_type("u/1700000000000.JPG"), "image/jpeg");
        assert_eq!(content_type("u/photo.webp"), "image/webp");
        assert_eq!(content_type("u/noext"), "application/octet-stream");
    }
}
