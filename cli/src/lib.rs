//! The CLI crate: the external collaborator named in spec.md's Out-of-scope
//! paragraph — argument parsing, config loading, session persistence,
//! terminal rendering, and the concrete HTTP-backed `ModelClient`. Exposed
//! as a library too so `main.rs` stays a thin `run_main` call and the
//! pieces below are independently testable.

pub mod cli;
pub mod logging;
pub mod model_client;
pub mod permission_ui;
pub mod run;
pub mod session_store;
