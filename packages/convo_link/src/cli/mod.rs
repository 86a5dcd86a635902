pub mod render;
pub mod watch;

use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use convo_link::{
    ClientConfig, ClientHandle, ClientUpdate, ConvoPaths, CredentialStore, Directory,
    FileCredentialStore, Phase, Snapshot, spawn_client,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

pub fn login_command(paths: &ConvoPaths, token: &str) -> Result<()> {
    let mut store = FileCredentialStore::new(paths.credentials_path());
    store.store(token).context("Failed to save credential")?;
    eprintln!("[convo: logged in]");
    Ok(())
}

pub fn logout_command(paths: &ConvoPaths) -> Result<()> {
    let mut store = FileCredentialStore::new(paths.credentials_path());
    store.clear().context("Failed to remove credential")?;
    eprintln!("[convo: logged out]");
    Ok(())
}

pub async fn sessions_command(paths: &ConvoPaths, config: ClientConfig, json: bool) -> Result<()> {
    let snapshot = fetch_directory(paths, config).await?;
    let mut directory = Directory::new();
    directory.replace_agents(snapshot.agents);
    directory.replace_sessions(snapshot.sessions);

    let projects = directory.projects();
    if json {
        let rows: Vec<serde_json::Value> = projects
            .iter()
            .map(|p| {
                serde_json::json!({
                    "id": p.record.id,
                    "working_dir": p.record.working_dir,
                    "hostname": p.record.hostname,
                    "is_live": p.is_live,
                    "agent": p.agent.map(|a| a.id.as_str()),
                    "is_shared": p.record.is_shared,
                    "owner_email": p.record.owner_email,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if projects.is_empty() {
        println!("No sessions.");
        return Ok(());
    }
    for project in &projects {
        println!("{}", render::project_line(project));
    }
    Ok(())
}

pub async fn agents_command(paths: &ConvoPaths, config: ClientConfig, json: bool) -> Result<()> {
    let snapshot = fetch_directory(paths, config).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot.agents)?);
        return Ok(());
    }
    if snapshot.agents.is_empty() {
        println!("No agents.");
        return Ok(());
    }
    for agent in &snapshot.agents {
        println!("{}", render::agent_line(agent));
    }
    Ok(())
}

/// Connect, wait for both directory listings, and disconnect.
async fn fetch_directory(paths: &ConvoPaths, config: ClientConfig) -> Result<Snapshot> {
    let credentials = FileCredentialStore::new(paths.credentials_path());
    let (handle, task) = spawn_client(config, credentials, CancellationToken::new());
    let mut updates = handle.subscribe();

    let result = async {
        connect_and_wait(&handle, &mut updates).await?;
        wait_for_directory(&handle, &mut updates).await
    }
    .await;

    handle.shutdown();
    let _ = task.await;
    result
}

/// Connect and wait until the connection is live.
pub(crate) async fn connect_and_wait(
    handle: &ClientHandle,
    updates: &mut broadcast::Receiver<ClientUpdate>,
) -> Result<()> {
    handle.connect().await?;
    tokio::time::timeout(CONNECT_TIMEOUT, async {
        loop {
            match updates.recv().await {
                Ok(ClientUpdate::Phase(Phase::Live)) => return Ok(()),
                Ok(ClientUpdate::Phase(phase @ Phase::Reconnecting { .. })) => {
                    eprintln!("[convo: {}]", phase);
                }
                Ok(ClientUpdate::Phase(Phase::Disconnected(reason))) => {
                    debug!("Connection ended: {:?}", reason);
                }
                Ok(ClientUpdate::LoginRequired { reason }) => {
                    bail!("login required ({reason}); run `convo login --token <TOKEN>`")
                }
                Ok(ClientUpdate::ReconnectGaveUp) => bail!("server unreachable, giving up"),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => debug!("Skipped {} updates", n),
                Err(broadcast::error::RecvError::Closed) => bail!("client stopped"),
            }
        }
    })
    .await
    .context("Timed out connecting to server")?
}

/// Wait until both the agent and session listings have arrived.
pub(crate) async fn wait_for_directory(
    handle: &ClientHandle,
    updates: &mut broadcast::Receiver<ClientUpdate>,
) -> Result<Snapshot> {
    tokio::time::timeout(CONNECT_TIMEOUT, async {
        loop {
            let snapshot = handle.snapshot().await?;
            if snapshot.directory_loaded {
                return Ok(snapshot);
            }
            match updates.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => bail!("client stopped"),
            }
        }
    })
    .await
    .context("Timed out waiting for session listing")?
}
