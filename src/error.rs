/// Errors raised by the lineage graph subsystem
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LineageError {
    #[error("failed to fetch lineage for {seed}: {message}")]
    Fetch { seed: String, message: String },

    #[error("lineage graph inconsistency: {details}")]
    Structural { details: String },

    #[error("invalid lineage options: {reason}")]
    InvalidOptions { reason: String },

    #[error("failed to decode provenance data: {0}")]
    Decode(String),
}

impl LineageError {
    pub fn structural(details: impl Into<String>) -> Self {
        LineageError::Structural {
            details: details.into(),
        }
    }

    pub fn invalid_options(reason: impl Into<String>) -> Self {
        LineageError::InvalidOptions {
            reason: reason.into(),
        }
    }

    pub fn missing_node(owner: &str, target: &str) -> Self {
        Self::structural(format!("node {owner} has an edge to unknown node {target}"))
    }
}

impl From<serde_json::Error> for LineageError {
    fn from(err: serde_json::Error) -> Self {
        LineageError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LineageError>;
