use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("tool not registered: {0}")]
    UnknownTool(String),

    #[error("checkpoint or adapter error: {0}")]
    Adapter(#[from] conveyor_exec::AdapterError),

    #[error("model client error: {0}")]
    Model(String),

    #[error("exceeded maximum iterations ({0})")]
    MaxIterationsExceeded(u32),

    #[error("missing default model: no model given and no defaultModel configured")]
    NoModelConfigured,

    #[error(transparent)]
    Config(#[from] conveyor_protocol::ConfigError),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
