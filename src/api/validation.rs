use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::api::errors::ApiError;

/// Checks extension and MIME type, returning the normalized extension.
pub(crate) fn validate_image_upload(
    filename: &str,
    content_type: &str,
    allowed_extensions: &[String],
) -> Result<String, ApiError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .ok_or_else(|| ApiError::BadRequest("File must have an extension".to_string()))?;

    if !allowed_extensions.iter().any(|allowed| allowed == &extension) {
        return Err(ApiError::BadRequest(format!("File extension '{extension}' is not allowed")));
    }

    let mime = content_type.trim().to_ascii_lowercase();
    if mime_allowed_for_extension(&mime, &extension) {
        Ok(extension)
    } else {
        Err(ApiError::BadRequest(format!(
            "MIME type '{mime}' does not match extension '.{extension}'"
        )))
    }
}

fn mime_allowed_for_extension(mime: &str, extension: &str) -> bool {
    match extension {
        "jpg" | "jpeg" => matches!(mime, "image/jpeg" | "image/jpg"),
        "png" => mime == "image/png",
        "webp" => mime == "image/webp",
        _ => false,
    }
}

/// Encodes the upload as a `data:` URL and enforces the encoded size limit.
pub(crate) fn encode_paper(bytes: &[u8], extension: &str, max_bytes: u64) -> Result<String, ApiError> {
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
    }

    let mime = if extension == "jpg" { "jpeg" } else { extension };
    let payload = format!("data:image/{mime};base64,{}", STANDARD.encode(bytes));
    if payload.len() as u64 > max_bytes {
        return Err(ApiError::PayloadTooLarge(format!(
            "Encoded image is {} bytes, the limit is {max_bytes}; compress the photo and retry",
            payload.len()
        )));
    }

    Ok(payload)
}
