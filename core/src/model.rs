//! The model client seam (C8). Renders the context window and tool
//! descriptors into a provider-specific request and parses the response
//! into a tool-call-or-final-answer. The concrete HTTP-backed
//! implementation lives in `conveyor-cli`, mirroring the split between the
//! teacher's `codex-core::client::ModelClient` trait and its OpenAI/ChatGPT
//! backends — out of scope here per spec.md §1.

use async_trait::async_trait;
use conveyor_protocol::Message;
use conveyor_protocol::ToolDescriptor;
use serde_json::Map;
use serde_json::Value;

use crate::error::Result;
use crate::session::SessionState;

/// `{toolChosen: true, toolCall} | {toolChosen: false, response}`, modeled
/// as a Rust enum rather than a struct with an optional field so callers
/// must match exhaustively.
#[derive(Debug, Clone)]
pub enum ModelDecision {
    ToolCall {
        tool_id: String,
        tool_use_id: String,
        args: Map<String, Value>,
    },
    Final {
        response: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub tool_choice: Option<String>,
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn get_tool_call(
        &self,
        query: &str,
        model: &str,
        tool_descriptions: &[ToolDescriptor],
        session: &SessionState,
    ) -> Result<ModelDecision>;

    async fn generate_response(
        &self,
        query: &str,
        model: &str,
        tool_descriptions: &[ToolDescriptor],
        session: &SessionState,
        options: GenerateOptions,
    ) -> Result<Message>;
}

/// Assembles the optional system prompt described in spec.md §4.8: a base
/// prompt, a directory-structure map, a git-state summary, and tool-error
/// breadcrumbs. Pure data shaping, no I/O — the adapter calls that produce
/// the map/git-summary inputs are the caller's job.
pub fn assemble_system_prompt(
    base_prompt: &str,
    directory_map: Option<&str>,
    git_summary: Option<&str>,
    last_tool_error: Option<&str>,
) -> String {
    let mut sections = vec![base_prompt.to_string()];
    if let Some(map) = directory_map {
        sections.push(format!("## Directory structure\n{map}"));
    }
    if let Some(git) = git_summary {
        sections.push(format!("## Git state\n{git}"));
    }
    if let Some(error) = last_tool_error {
        sections.push(format!("## Last tool error\n{error}"));
    }
    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_only_present_sections() {
        let prompt = assemble_system_prompt("base", Some("dir/"), None, Some("boom"));
        assert!(prompt.contains("base"));
        assert!(prompt.contains("Directory structure"));
        assert!(!prompt.contains("Git state"));
        assert!(prompt.contains("Last tool error"));
    }
}
