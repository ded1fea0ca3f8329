use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub(crate) enum DecodeError {
    #[error("image payload is empty")]
    Empty,
    #[error("malformed data url header")]
    MalformedHeader,
    #[error("image payload is not valid base64: {0}")]
    InvalidBase64(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DecodedImage {
    pub(crate) bytes: Vec<u8>,
    pub(crate) mime_type: String,
}

/// Decodes `data:image/<ext>;base64,<...>`. A bare base64 string is read as JPEG.
pub(crate) fn decode_payload(payload: &str) -> Result<DecodedImage, DecodeError> {
    let payload = payload.trim();
    let (mime_type, encoded) = match payload.strip_prefix("data:") {
        Some(rest) => {
            let (header, encoded) = rest.split_once(',').ok_or(DecodeError::MalformedHeader)?;
            let mime_type =
                header.strip_suffix(";base64").ok_or(DecodeError::MalformedHeader)?.trim();
            if !mime_type.starts_with("image/") {
                return Err(DecodeError::MalformedHeader);
            }
            (mime_type.to_string(), encoded)
        }
        None => ("image/jpeg".to_string(), payload),
    };

    if encoded.trim().is_empty() {
        return Err(DecodeError::Empty);
    }

    let bytes =
        STANDARD.decode(encoded.trim()).map_err(|err| DecodeError::InvalidBase64(err.to_string()))?;
    Ok(DecodedImage { bytes, mime_type })
}

/// Decoded page written to the scratch directory for the duration of one
/// recognition call. The file is removed when the value is dropped.
pub(crate) struct ScratchImage {
    file: NamedTempFile,
    mime_type: String,
}

impl ScratchImage {
    pub(crate) async fn materialize(dir: &Path, image: DecodedImage) -> anyhow::Result<Self> {
        let dir: PathBuf = dir.to_path_buf();
        let suffix = format!(".{}", image.mime_type.trim_start_matches("image/"));

        tokio::task::spawn_blocking(move || -> anyhow::Result<Self> {
            let mut file = tempfile::Builder::new()
                .prefix("markscan-")
                .suffix(&suffix)
                .tempfile_in(&dir)
                .with_context(|| format!("failed to create scratch file in {}", dir.display()))?;
            file.write_all(&image.bytes).context("failed to write scratch image")?;
            file.flush().context("failed to flush scratch image")?;
            Ok(Self { file, mime_type: image.mime_type })
        })
        .await
        .context("scratch writer panicked")?
    }

    pub(crate) async fn read(&self) -> anyhow::Result<Vec<u8>> {
        tokio::fs::read(self.file.path())
            .await
            .with_context(|| format!("failed to read {}", self.file.path().display()))
    }

    pub(crate) fn mime_type(&self) -> &str {
        &self.mime_type
    }
}
