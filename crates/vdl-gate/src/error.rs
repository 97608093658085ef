use vdl_crypto::EncodingError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    /// A stage refused the append.
    #[error("append denied by {stage}: {reason}")]
    Denied { stage: String, reason: String },

    /// A stage failed to decide, e.g. its key store is unavailable.
    #[error("gate stage {stage} failed: {message}")]
    Stage { stage: String, message: String },

    #[error("governance policy not encodable: {0}")]
    Encoding(#[from] EncodingError),
}

impl GateError {
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }
}
