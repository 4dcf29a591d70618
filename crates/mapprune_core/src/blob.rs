use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde_json::Value;

use crate::error::CoreError;

/// Compression applied to a `files` row payload, as recorded in the
/// `compression` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobCompression {
    None,
    Zlib,
}

impl BlobCompression {
    pub fn from_tag(tag: Option<&str>) -> Result<Self, CoreError> {
        match tag {
            None | Some("none") => Ok(Self::None),
            Some("zlib") => Ok(Self::Zlib),
            Some(other) => Err(CoreError::format(format!(
                "unsupported compression tag {other:?}"
            ))),
        }
    }

    pub fn tag(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Zlib => Some("zlib"),
        }
    }
}

/// Decode an overmap payload into its version line and JSON document.
/// The stored text looks like `# version N\n{...json...}`.
pub fn decode_overmap_blob(
    compression: BlobCompression,
    blob: &[u8],
) -> Result<(String, Value), CoreError> {
    let raw = match compression {
        BlobCompression::None => blob.to_vec(),
        BlobCompression::Zlib => {
            let mut decoder = ZlibDecoder::new(blob);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| CoreError::format(format!("zlib decode failed: {e}")))?;
            out
        }
    };

    let text = String::from_utf8(raw)
        .map_err(|e| CoreError::format(format!("overmap payload is not UTF-8: {e}")))?;
    let Some((version_line, json_text)) = text.split_once('\n') else {
        return Err(CoreError::format(
            "overmap payload missing newline separator",
        ));
    };
    let doc: Value = serde_json::from_str(json_text)
        .map_err(|e| CoreError::format(format!("overmap JSON parse failed: {e}")))?;
    Ok((version_line.to_string(), doc))
}

/// Inverse of [`decode_overmap_blob`]: compact JSON behind the version line,
/// recompressed when the row was compressed.
pub fn encode_overmap_blob(
    compression: BlobCompression,
    version_line: &str,
    doc: &Value,
) -> Result<Vec<u8>, CoreError> {
    let json_text = serde_json::to_string(doc)
        .map_err(|e| CoreError::format(format!("overmap JSON serialize failed: {e}")))?;
    let mut raw = Vec::with_capacity(version_line.len() + 1 + json_text.len());
    raw.extend_from_slice(version_line.as_bytes());
    raw.push(b'\n');
    raw.extend_from_slice(json_text.as_bytes());

    match compression {
        BlobCompression::None => Ok(raw),
        BlobCompression::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder
                .write_all(&raw)
                .map_err(|e| CoreError::format(format!("zlib encode failed: {e}")))?;
            encoder
                .finish()
                .map_err(|e| CoreError::format(format!("zlib encode failed: {e}")))
        }
    }
}
