//! Execution adapters (C2), the checkpoint manager (C3), and the
//! checkpointing wrapper (C4) that decorates an adapter with shadow-repo
//! snapshots before any state-changing call.

pub mod adapter;
pub mod checkpoint;
pub mod container;
pub mod error;
pub mod factory;
pub mod host;
pub mod remote;
mod util;
pub mod wrapper;

pub use adapter::CancelSignal;
pub use adapter::CommandOutput;
pub use adapter::ExecutionAdapter;
pub use adapter::FileEdit;
pub use adapter::FileRead;
pub use adapter::GlobOpts;
pub use adapter::LsEntry;
pub use adapter::LsResult;
pub use checkpoint::CheckpointManager;
pub use container::ContainerAdapter;
pub use error::AdapterError;
pub use factory::AdapterFactory;
pub use factory::BackendSpec;
pub use host::HostAdapter;
pub use remote::RemoteAdapter;
pub use remote::RemoteIdResolver;
pub use wrapper::CheckpointingWrapper;
pub use wrapper::SnapshotHook;
