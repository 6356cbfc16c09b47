use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse agent config: {0}")]
    Parse(String),

    #[error("invalid agent config: {0}")]
    Guard(String),
}
