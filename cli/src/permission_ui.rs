//! Terminal permission prompt: the default [`PermissionUiHandler`] a running
//! CLI session wires into its [`conveyor_core::permission::PermissionGate`].

use async_trait::async_trait;
use conveyor_core::permission::PermissionUiHandler;
use conveyor_protocol::ToolDescriptor;
use serde_json::Value;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;

pub struct TerminalPermissionUi;

#[async_trait]
impl PermissionUiHandler for TerminalPermissionUi {
    async fn ask(&self, descriptor: Option<&ToolDescriptor>, tool_id: &str, args: &Value) -> bool {
        let name = descriptor.map(|d| d.name.as_str()).unwrap_or(tool_id);
        println!("conveyor wants to run `{name}` with args: {args}");
        println!("Allow? [y/N] ");

        let mut line = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        match stdin.read_line(&mut line).await {
            Ok(_) => matches!(line.trim().to_lowercase().as_str(), "y" | "yes"),
            Err(_) => false,
        }
    }
}
