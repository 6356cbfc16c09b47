//! Wire types shared by every crate in the workspace.
//!
//! Nothing in this crate performs I/O. It only defines the data that flows
//! between the context window, the execution adapters, the tool registry and
//! the event bus so that all of those crates can agree on a single vocabulary
//! without depending on each other.

pub mod config;
pub mod error;
pub mod event;
pub mod message;
pub mod session_types;
pub mod tool;

pub use config::AgentConfig;
pub use error::ConfigError;
pub use event::Event;
pub use event::EventMsg;
pub use message::ContentPart;
pub use message::Message;
pub use message::Role;
pub use session_types::CheckpointPayload;
pub use session_types::GitRepoInfo;
pub use session_types::SnapshotMetadata;
pub use session_types::SnapshotReason;
pub use tool::ToolCategory;
pub use tool::ToolDescriptor;
pub use tool::ToolOutcome;
