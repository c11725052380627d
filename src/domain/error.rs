use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UriError {
    #[error("malformed uri `{uri}`: {reason}")]
    Malformed { uri: String, reason: &'static str },
}

impl UriError {
    pub fn malformed(uri: impl Into<String>, reason: &'static str) -> Self {
        Self::Malformed {
            uri: uri.into(),
            reason,
        }
    }
}
