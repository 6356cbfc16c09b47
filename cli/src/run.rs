//! Wires a parsed [`Cli`] into a running [`conveyor_core::agent::Agent`]:
//! load config, bring up the execution backend (checkpointing-wrapped),
//! construct the model client and permission gate, run one query, persist
//! the session. Mirrors the shape of `codex-exec::run_main`, trimmed to a
//! single non-interactive turn since this runtime has no TUI counterpart.

use std::io::IsTerminal;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use conveyor_core::agent::Agent;
use conveyor_core::permission::PermissionGate;
use conveyor_exec::AdapterFactory;
use conveyor_exec::BackendSpec;
use conveyor_exec::CheckpointingWrapper;
use conveyor_protocol::AgentConfig;
use conveyor_protocol::config::EnvironmentType;
use tracing::info;

use crate::cli::Cli;
use crate::logging;
use crate::model_client::HttpModelClient;
use crate::permission_ui::TerminalPermissionUi;
use crate::session_store;
use crate::session_store::PersistedSession;

pub async fn run_main(cli: Cli) -> anyhow::Result<()> {
    let config_raw = tokio::fs::read_to_string(&cli.config).await?;
    let config: AgentConfig = AgentConfig::from_str(&config_raw)?;

    logging::init(config.log_level);

    let query = resolve_query(cli.query.clone())?;

    let cwd = std::env::current_dir()?;
    let repo_roots = if cli.repo_roots.is_empty() { vec![cwd.clone()] } else { cli.repo_roots.clone() };

    let backend_spec = match config.environment.kind {
        EnvironmentType::Local => BackendSpec::Host {
            repo_roots: repo_roots.clone(),
        },
        EnvironmentType::Docker => BackendSpec::Container {
            container_id: cli
                .container_id
                .clone()
                .ok_or_else(|| anyhow::anyhow!("environment.type = \"docker\" requires --container-id"))?,
            repo_roots: repo_roots.iter().map(|p| p.to_string_lossy().to_string()).collect(),
        },
        EnvironmentType::Remote => BackendSpec::Remote {
            base_url: cli
                .remote_base_url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("environment.type = \"remote\" requires --remote-base-url"))?,
        },
    };

    let session_id = uuid::Uuid::new_v4().to_string();
    let factory = AdapterFactory::new(cli.auto_fallback_to_host);
    let raw_adapter = factory.build(&session_id, backend_spec, repo_roots.clone()).await?;
    let adapter = Arc::new(CheckpointingWrapper::new(raw_adapter, session_id.clone(), repo_roots.clone()));

    let model_client = Arc::new(HttpModelClient::new(cli.model_base_url.clone(), cli.model_api_key.clone()));

    let permission_gate = Arc::new(PermissionGate::new(Arc::new(TerminalPermissionUi)));
    permission_gate.set_danger_mode(cli.danger);
    permission_gate.set_fast_edit_mode(cli.fast_edit);

    let agent = Agent::new(session_id.clone(), &config, adapter, model_client, permission_gate)?;

    if let Some(resume_path) = &cli.resume {
        restore_into_agent(&agent, resume_path).await?;
    }

    info!(session_id, "processing query");
    let result = agent.process_query(&query, cli.model.as_deref()).await?;

    if let Some(response) = &result.response {
        println!("{response}");
    }
    if let Some(error) = &result.error {
        eprintln!("error: {error}");
    }

    let messages = {
        let ctx = agent.session.context.lock().map_err(|_| anyhow::anyhow!("context window lock poisoned"))?;
        ctx.messages().to_vec()
    };
    let persisted = PersistedSession {
        created_at: time::OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339)?,
        cwd: cwd.to_string_lossy().to_string(),
        git_commit: None,
        messages,
    };
    let saved_path = session_store::save_session(&cwd, &persisted).await?;
    info!(path = %saved_path.display(), "session saved");

    if result.error.is_some() {
        std::process::exit(1);
    }
    Ok(())
}

fn resolve_query(positional: Option<String>) -> anyhow::Result<String> {
    match positional {
        Some(q) if q != "-" => Ok(q),
        maybe_dash => {
            let force_stdin = matches!(maybe_dash.as_deref(), Some("-"));
            if std::io::stdin().is_terminal() && !force_stdin {
                anyhow::bail!("no query provided; pass one as an argument or pipe it into stdin");
            }
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            if buffer.trim().is_empty() {
                anyhow::bail!("no query provided via stdin");
            }
            Ok(buffer)
        }
    }
}

async fn restore_into_agent(agent: &Agent, resume_path: &PathBuf) -> anyhow::Result<()> {
    let persisted = session_store::load_session(resume_path).await?;
    let mut ctx = agent.session.context.lock().map_err(|_| anyhow::anyhow!("context window lock poisoned"))?;
    for message in persisted.messages {
        ctx.restore_message(message);
    }
    Ok(())
}
