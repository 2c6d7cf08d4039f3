//! Drawing payload decoding.
//!
//! A drawing arrives either as raw PNG bytes or as a base64 `data:` URL the
//! way a canvas exports it.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use chrono::Utc;

use crate::types::{ChatError, ChatResult};

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedDrawing {
    pub bytes: Bytes,
    pub content_type: String,
    pub extension: String,
}

/// Decode a drawing payload. Returns `Ok(None)` when there is nothing to send.
pub fn decode_drawing(payload: &[u8]) -> ChatResult<Option<DecodedDrawing>> {
    let payload = payload.trim_ascii();
    if payload.is_empty() {
        return Ok(None);
    }

    if payload.starts_with(b"data:") {
        let url = std::str::from_utf8(payload)
            .map_err(|_| ChatError::invalid_drawing("data URL is not valid UTF-8"))?;
        return decode_data_url(url).map(Some);
    }

    if !payload.starts_with(PNG_SIGNATURE) {
        return Err(ChatError::invalid_drawing("expected PNG data or a data URL"));
    }
    Ok(Some(DecodedDrawing {
        bytes: Bytes::copy_from_slice(payload),
        content_type: "image/png".to_string(),
        extension: "png".to_string(),
    }))
}

fn decode_data_url(url: &str) -> ChatResult<DecodedDrawing> {
    let rest = &url["data:".len()..];
    let (header, data) = rest
        .split_once(',')
        .ok_or_else(|| ChatError::invalid_drawing("data URL has no payload"))?;
    let content_type = header
        .strip_suffix(";base64")
        .ok_or_else(|| ChatError::invalid_drawing("data URL is not base64 encoded"))?;
    let extension = image_extension(content_type)
        .ok_or_else(|| ChatError::invalid_drawing(format!("unsupported content type {content_type:?}")))?;

    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| ChatError::invalid_drawing(format!("bad base64: {e}")))?;
    if bytes.is_empty() {
        return Err(ChatError::invalid_drawing("data URL payload is empty"));
    }

    Ok(DecodedDrawing {
        bytes: Bytes::from(bytes),
        content_type: content_type.to_string(),
        extension,
    })
}

fn image_extension(content_type: &str) -> Option<String> {
    let subtype = content_type.strip_prefix("image/")?;
    match subtype {
        "jpeg" => Some("jpg".to_string()),
        "svg+xml" => Some("svg".to_string()),
        other if !other.is_empty() && other.chars().all(|c| c.is_ascii_alphanumeric()) => {
            Some(other.to_ascii_lowercase())
        }
        _ => None,
    }
}

/// Object path for a drawing: `drawings/<sender>/<micros>-<cuid>.<ext>`.
pub fn drawing_object_path(sender: &str, extension: &str) -> String {
    let sender: String = sender
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let sender = sender.trim_start_matches('.');
    let sender = if sender.is_empty() { "_" } else { sender };
    format!(
        "drawings/{sender}/{}-{}.{extension}",
        Utc::now().timestamp_micros(),
        cuid2::create_id()
    )
}
