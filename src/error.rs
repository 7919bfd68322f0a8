use thiserror::Error;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("prompt is too long ({tokens} tokens, max {max})")]
    PromptTooLong { tokens: usize, max: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("evaluation failed: {0}")]
    Eval(String),

    #[error("sampling failed: {0}")]
    Sample(String),

    #[error("tokenization failed: {0}")]
    Tokenize(String),

    #[error("context overflow after swap (keep={keep}, batch={batch}, capacity={capacity})")]
    ContextOverflow {
        keep: usize,
        batch: usize,
        capacity: usize,
    },

    #[error("io error, {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error, {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, InferenceError>;
