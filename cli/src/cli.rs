//! Command-line surface. Mirrors the teacher's `codex-exec` flag set
//! (image/model/sandbox/color) trimmed to what this runtime actually needs,
//! plus the environment-backend selection flags spec.md §6 leaves to the
//! CLI layer rather than the agent configuration file.

use std::path::PathBuf;

use clap::Parser;
use clap::ValueEnum;

#[derive(Parser, Debug)]
#[command(name = "conveyor", version)]
pub struct Cli {
    /// Path to the agent configuration file (TOML or JSON).
    #[arg(long = "config", short = 'c')]
    pub config: PathBuf,

    /// Model to use for this run; overrides `defaultModel` from the config.
    #[arg(long, short = 'm')]
    pub model: Option<String>,

    /// Repository roots the execution adapter may touch (host/container
    /// backends). Defaults to the current directory.
    #[arg(long = "repo", value_name = "PATH")]
    pub repo_roots: Vec<PathBuf>,

    /// Container id to attach to, when `environment.type = "docker"`.
    #[arg(long = "container-id")]
    pub container_id: Option<String>,

    /// Base URL of the remote sandbox, when `environment.type = "remote"`.
    #[arg(long = "remote-base-url")]
    pub remote_base_url: Option<String>,

    /// Skip asking for permission on every sensitive tool call.
    #[arg(long = "danger", default_value_t = false)]
    pub danger: bool,

    /// Grant file-op tools permission automatically (still asks for shell
    /// and network tools).
    #[arg(long = "fast-edit", default_value_t = false)]
    pub fast_edit: bool,

    /// Fall back to the host backend if the configured one can't be reached.
    #[arg(long = "auto-fallback-host", default_value_t = false)]
    pub auto_fallback_to_host: bool,

    /// Base URL of the model HTTP endpoint.
    #[arg(long = "model-base-url", env = "CONVEYOR_MODEL_BASE_URL")]
    pub model_base_url: String,

    /// API key for the model endpoint.
    #[arg(long = "model-api-key", env = "CONVEYOR_MODEL_API_KEY")]
    pub model_api_key: Option<String>,

    /// Resume a previous session from its persisted state file instead of
    /// starting fresh.
    #[arg(long = "resume")]
    pub resume: Option<PathBuf>,

    /// Color settings for terminal output.
    #[arg(long = "color", value_enum, default_value_t = Color::Auto)]
    pub color: Color,

    /// Initial query. Read from stdin when omitted or `-`.
    pub query: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum Color {
    Always,
    Never,
    #[default]
    Auto,
}
