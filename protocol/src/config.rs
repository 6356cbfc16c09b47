//! Agent configuration: the mapping described in the external interfaces
//! section. Loading the TOML/JSON off disk and merging CLI overrides is the
//! caller's job (see `conveyor_cli`); this module only owns the shape and the
//! semantic validation that must hold regardless of where the value came
//! from.

use serde::Deserialize;
use serde::Serialize;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentType {
    Local,
    Docker,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    #[serde(rename = "type")]
    pub kind: EnvironmentType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// Either an inline prompt string or a pointer to a file on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemPromptSpec {
    Inline(String),
    File {
        file: String,
    },
}

/// A tool entry: either a bare name, or a name with a per-tool config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolSpec {
    Name(String),
    Configured {
        name: String,
        #[serde(rename = "configFile")]
        config_file: String,
    },
}

impl ToolSpec {
    pub fn name(&self) -> &str {
        match self {
            ToolSpec::Name(n) => n,
            ToolSpec::Configured { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentalFeatures {
    #[serde(default)]
    pub sub_agents: bool,
    #[serde(default)]
    pub prompt_files: bool,
    #[serde(default)]
    pub local_environment: bool,
}

fn default_caching_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    pub environment: EnvironmentConfig,
    #[serde(default, rename = "defaultModel")]
    pub default_model: Option<String>,
    #[serde(default, rename = "logLevel")]
    pub log_level: LogLevel,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "allowedTools")]
    pub allowed_tools: Option<Vec<String>>,
    #[serde(default = "default_caching_enabled", rename = "cachingEnabled")]
    pub caching_enabled: bool,
    #[serde(rename = "systemPrompt")]
    pub system_prompt: SystemPromptSpec,
    #[serde(default)]
    pub tools: Option<Vec<ToolSpec>>,
    #[serde(default, rename = "experimentalFeatures")]
    pub experimental_features: ExperimentalFeatures,
}

impl AgentConfig {
    /// Parse and validate a raw TOML/JSON document. Unknown keys are
    /// rejected by `serde`'s `deny_unknown_fields`; the remaining semantic
    /// guards are enforced here because they cross multiple fields.
    pub fn from_str(raw: &str) -> Result<Self, ConfigError> {
        let config: AgentConfig = if raw.trim_start().starts_with('{') {
            serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?
        } else {
            toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.environment.kind == EnvironmentType::Local
            && !self.experimental_features.local_environment
        {
            return Err(ConfigError::Guard(
                "environment.type = \"local\" requires experimentalFeatures.localEnvironment = true"
                    .to_string(),
            ));
        }

        if matches!(self.system_prompt, SystemPromptSpec::File { .. })
            && !self.experimental_features.prompt_files
        {
            return Err(ConfigError::Guard(
                "systemPrompt.file requires experimentalFeatures.promptFiles = true".to_string(),
            ));
        }

        if let Some(tools) = &self.tools {
            let has_sub_agent = tools.iter().any(|t| t.name() == "sub_agent");
            if has_sub_agent && !self.experimental_features.sub_agents {
                return Err(ConfigError::Guard(
                    "a sub_agent tool entry requires experimentalFeatures.subAgents = true"
                        .to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_local_config() -> &'static str {
        r#"
        systemPrompt = "you are helpful"
        [environment]
        type = "local"
        [experimentalFeatures]
        localEnvironment = true
        "#
    }

    #[test]
    fn parses_minimal_config() {
        let config = AgentConfig::from_str(minimal_local_config()).expect("should parse");
        assert_eq!(config.environment.kind, EnvironmentType::Local);
        assert!(config.caching_enabled);
    }

    #[test]
    fn rejects_unknown_keys() {
        let raw = r#"
        systemPrompt = "hi"
        bogusKey = true
        [environment]
        type = "local"
        [experimentalFeatures]
        localEnvironment = true
        "#;
        assert!(AgentConfig::from_str(raw).is_err());
    }

    #[test]
    fn local_environment_requires_flag() {
        let raw = r#"
        systemPrompt = "hi"
        [environment]
        type = "local"
        "#;
        match AgentConfig::from_str(raw) {
            Err(ConfigError::Guard(_)) => {}
            other => panic!("expected guard error, got {other:?}"),
        }
    }

    #[test]
    fn prompt_file_requires_flag() {
        let raw = r#"
        [systemPrompt]
        file = "SYSTEM.md"
        [environment]
        type = "docker"
        "#;
        match AgentConfig::from_str(raw) {
            Err(ConfigError::Guard(_)) => {}
            other => panic!("expected guard error, got {other:?}"),
        }
    }

    #[test]
    fn sub_agent_tool_requires_flag() {
        let raw = r#"
        systemPrompt = "hi"
        tools = ["bash", "sub_agent"]
        [environment]
        type = "docker"
        "#;
        match AgentConfig::from_str(raw) {
            Err(ConfigError::Guard(_)) => {}
            other => panic!("expected guard error, got {other:?}"),
        }
    }
}
