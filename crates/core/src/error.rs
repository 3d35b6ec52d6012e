/// Result alias that carries the custom [`PlayerError`] type.
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    /// The declared MIME category is neither `audio` nor `video`. Raised
    /// before any load is attempted.
    #[error("unplayable file type `{mime}`")]
    UnplayableType { mime: String },
    /// The decoder rejected the payload.
    #[error("could not decode audio: {reason}")]
    DecodeFailure { reason: String },
    /// The audio output refused to accept a new voice.
    #[error("audio output error: {0}")]
    Output(String),
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Message(String),
}

impl PlayerError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn decode<T: Into<String>>(reason: T) -> Self {
        Self::DecodeFailure {
            reason: reason.into(),
        }
    }

    /// Whether the error is one that should be shown to the user as a
    /// transient notice rather than aborting the caller.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::UnplayableType { .. } | Self::DecodeFailure { .. }
        )
    }
}

impl From<&str> for PlayerError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for PlayerError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl From<symphonia::core::errors::Error> for PlayerError {
    fn from(value: symphonia::core::errors::Error) -> Self {
        Self::decode(value.to_string())
    }
}
