//! Builds the right [`ExecutionAdapter`] for an `environment.type`, with
//! optional fallback to [`HostAdapter`] when the requested backend can't be
//! brought up (e.g. the container daemon isn't reachable).

use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;

use crate::adapter::ExecutionAdapter;
use crate::container::ContainerAdapter;
use crate::error::AdapterError;
use crate::error::Result;
use crate::host::HostAdapter;
use crate::remote::RemoteAdapter;
use crate::remote::RemoteIdResolver;

#[derive(Debug, Clone)]
pub enum BackendSpec {
    Host { repo_roots: Vec<PathBuf> },
    Container { container_id: String, repo_roots: Vec<String> },
    Remote { base_url: String },
}

pub struct AdapterFactory {
    pub auto_fallback_to_host: bool,
    pub remote_id_resolver: Option<RemoteIdResolver>,
}

impl AdapterFactory {
    pub fn new(auto_fallback_to_host: bool) -> Self {
        Self {
            auto_fallback_to_host,
            remote_id_resolver: None,
        }
    }

    pub fn with_remote_id_resolver(mut self, resolver: RemoteIdResolver) -> Self {
        self.remote_id_resolver = Some(resolver);
        self
    }

    /// Bring up the requested backend. On failure to probe a `Container` or
    /// `Remote` backend, falls back to `Host` iff `auto_fallback_to_host` is
    /// set; otherwise the original error propagates.
    pub async fn build(
        &self,
        session_id: &str,
        spec: BackendSpec,
        default_repo_roots: Vec<PathBuf>,
    ) -> Result<Arc<dyn ExecutionAdapter>> {
        match self.try_build(session_id, &spec).await {
            Ok(adapter) => Ok(adapter),
            Err(e) if self.auto_fallback_to_host => {
                warn!(error = %e, "falling back to host execution adapter");
                Ok(Arc::new(HostAdapter::new(default_repo_roots)))
            }
            Err(e) => Err(e),
        }
    }

    async fn try_build(&self, session_id: &str, spec: &BackendSpec) -> Result<Arc<dyn ExecutionAdapter>> {
        match spec {
            BackendSpec::Host { repo_roots } => Ok(Arc::new(HostAdapter::new(repo_roots.clone()))),
            BackendSpec::Container {
                container_id,
                repo_roots,
            } => {
                probe_container(container_id).await?;
                Ok(Arc::new(ContainerAdapter::new(container_id.clone(), repo_roots.clone())))
            }
            BackendSpec::Remote { base_url } => Ok(Arc::new(RemoteAdapter::new(
                session_id,
                base_url.clone(),
                self.remote_id_resolver.clone(),
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn host_backend_always_builds() {
        let factory = AdapterFactory::new(false);
        let adapter = factory
            .build("sess-1", BackendSpec::Host { repo_roots: vec![] }, vec![])
            .await
            .expect("host backend should always build");
        adapter.get_directory_structures().await.expect("no-op query");
    }

    #[tokio::test]
    async fn unreachable_container_without_fallback_propagates_the_error() {
        let factory = AdapterFactory::new(false);
        let result = factory
            .build(
                "sess-1",
                BackendSpec::Container {
                    container_id: "definitely-not-a-real-container-id".to_string(),
                    repo_roots: vec![],
                },
                vec![],
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unreachable_container_with_fallback_returns_a_host_adapter() {
        let factory = AdapterFactory::new(true);
        let result = factory
            .build(
                "sess-1",
                BackendSpec::Container {
                    container_id: "definitely-not-a-real-container-id".to_string(),
                    repo_roots: vec![],
                },
                vec![PathBuf::from(".")],
            )
            .await;
        assert!(result.is_ok(), "auto-fallback should mask the container probe failure");
    }
}

async fn probe_container(container_id: &str) -> Result<()> {
    let output = tokio::process::Command::new("docker")
        .args(["inspect", "-f", "{{.State.Running}}", container_id])
        .output()
        .await
        .map_err(|e| AdapterError::Backend(format!("docker daemon unavailable: {e}")))?;

    if !output.status.success() || String::from_utf8_lossy(&output.stdout).trim() != "true" {
        return Err(AdapterError::Backend(format!(
            "container {container_id} is not running"
        )));
    }
    Ok(())
}
