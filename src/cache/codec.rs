//! Cache value framing.
//!
//! A cached node is stored as the UTF-8 bytes of `"{uri}|{content}"`, with
//! [`NONE`] standing in for absent content. Values never hold serialized
//! in-process objects, so any byte-oriented cache provider can store them.
//! This format is persisted in shared caches and must stay decodable.

use bytes::Bytes;
use thiserror::Error;

pub const DELIMITER: char = '|';
pub const NONE: &str = "<NoneType>";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("cached value is not valid utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

/// Decoded cache value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub uri: Option<String>,
    pub content: Option<String>,
}

pub fn encode(uri: &str, content: Option<&str>) -> Bytes {
    let content = content.unwrap_or(NONE);
    let mut value = String::with_capacity(uri.len() + 1 + content.len());
    value.push_str(uri);
    value.push(DELIMITER);
    value.push_str(content);
    Bytes::from(value)
}

/// Split a cached value on its first delimiter.
///
/// A value without delimiter decodes to the whole text as uri and empty content.
pub fn decode(value: &[u8]) -> Result<Decoded, CodecError> {
    let text = std::str::from_utf8(value)?;
    let (uri, content) = text.split_once(DELIMITER).unwrap_or((text, ""));

    Ok(Decoded {
        uri: (!uri.is_empty()).then(|| uri.to_string()),
        content: (content != NONE).then(|| content.to_string()),
    })
}
