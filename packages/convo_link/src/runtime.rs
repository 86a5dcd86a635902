//! Tokio runtime loop.
//!
//! Owns a [`SyncClient`] on a single task and feeds it, one at a time,
//! transport events, timer firings and requests from [`ClientHandle`]s.
//! Updates are fanned out on a broadcast channel after every input.

use convo_wire::{ConversationEntry, RemoteAgent, SessionRecord};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::{SyncClient, UiCommand};
use crate::config::ClientConfig;
use crate::connection::Phase;
use crate::credentials::CredentialStore;
use crate::effect::{ClientUpdate, TimerToken};
use crate::error::{ClientError, CommandRejected};
use crate::history::Pane;
use crate::session::SessionViewState;
use crate::timers::TokioTimers;
use crate::transport::websocket::{ConnectionEvent, WsTransport};

const REQUEST_BUFFER: usize = 64;
const UPDATE_BUFFER: usize = 1024;

/// Point-in-time copy of everything the UI renders.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub phase: Phase,
    pub view: SessionViewState,
    pub panes: Vec<(Pane, Vec<ConversationEntry>)>,
    pub agents: Vec<RemoteAgent>,
    pub sessions: Vec<SessionRecord>,
    /// Both directory listings have arrived since startup.
    pub directory_loaded: bool,
}

#[derive(Debug)]
enum ClientRequest {
    Connect,
    Disconnect,
    Foreground,
    Execute {
        command: UiCommand,
        respond_to: oneshot::Sender<Result<(), CommandRejected>>,
    },
    Snapshot {
        respond_to: oneshot::Sender<Snapshot>,
    },
}

/// Handle to the client task.
#[derive(Clone)]
pub struct ClientHandle {
    sender: mpsc::Sender<ClientRequest>,
    updates: broadcast::Sender<ClientUpdate>,
    cancel: CancellationToken,
}

impl ClientHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<ClientUpdate> {
        self.updates.subscribe()
    }

    pub async fn connect(&self) -> Result<(), ClientError> {
        self.request(ClientRequest::Connect).await
    }

    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.request(ClientRequest::Disconnect).await
    }

    pub async fn foreground(&self) -> Result<(), ClientError> {
        self.request(ClientRequest::Foreground).await
    }

    pub async fn execute(&self, command: UiCommand) -> Result<(), ClientError> {
        let (tx, rx) = oneshot::channel();
        self.request(ClientRequest::Execute {
            command,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| ClientError::Stopped)??;
        Ok(())
    }

    pub async fn snapshot(&self) -> Result<Snapshot, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.request(ClientRequest::Snapshot { respond_to: tx })
            .await?;
        rx.await.map_err(|_| ClientError::Stopped)
    }

    /// Stop the client task. The connection is closed normally first.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn request(&self, request: ClientRequest) -> Result<(), ClientError> {
        self.sender
            .send(request)
            .await
            .map_err(|_| ClientError::Stopped)
    }
}

/// Spawn the client task on the current runtime, connected to
/// `config.server_url` over WebSocket.
pub fn spawn_client<C>(
    config: ClientConfig,
    credentials: C,
    cancel: CancellationToken,
) -> (ClientHandle, JoinHandle<()>)
where
    C: CredentialStore + Send + 'static,
{
    let (conn_tx, conn_rx) = mpsc::unbounded_channel();
    let (timer_tx, timer_rx) = mpsc::unbounded_channel();
    let (request_tx, request_rx) = mpsc::channel(REQUEST_BUFFER);
    let (update_tx, _) = broadcast::channel(UPDATE_BUFFER);

    let transport = WsTransport::new(config.server_url.clone(), conn_tx);
    let timers = TokioTimers::new(timer_tx);
    let client = SyncClient::new(&config, transport, timers, credentials);

    let actor = ClientActor {
        client,
        connection_events: conn_rx,
        timer_events: timer_rx,
        requests: request_rx,
        updates: update_tx.clone(),
        cancel: cancel.clone(),
    };
    let task = tokio::spawn(actor.run());

    let handle = ClientHandle {
        sender: request_tx,
        updates: update_tx,
        cancel,
    };
    (handle, task)
}

struct ClientActor<C> {
    client: SyncClient<WsTransport, TokioTimers, C>,
    connection_events: mpsc::UnboundedReceiver<ConnectionEvent>,
    timer_events: mpsc::UnboundedReceiver<TimerToken>,
    requests: mpsc::Receiver<ClientRequest>,
    updates: broadcast::Sender<ClientUpdate>,
    cancel: CancellationToken,
}

impl<C: CredentialStore> ClientActor<C> {
    async fn run(mut self) {
        debug!("Client task started");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Client shutting down");
                    self.client.disconnect();
                    self.publish();
                    break;
                }
                Some(ev) = self.connection_events.recv() => {
                    if ev.generation != self.client.transport().generation() {
                        debug!("Dropping {:?} from stale connection {}", ev.event, ev.generation);
                        continue;
                    }
                    self.client.handle_transport(ev.event);
                }
                Some(token) = self.timer_events.recv() => {
                    self.client.handle_timer(token);
                }
                request = self.requests.recv() => match request {
                    Some(request) => self.handle_request(request),
                    None => {
                        debug!("All client handles dropped");
                        self.client.disconnect();
                        break;
                    }
                },
            }
            self.publish();
        }
        debug!("Client task stopped");
    }

    fn handle_request(&mut self, request: ClientRequest) {
        match request {
            ClientRequest::Connect => self.client.connect(),
            ClientRequest::Disconnect => self.client.disconnect(),
            ClientRequest::Foreground => self.client.foreground(),
            ClientRequest::Execute {
                command,
                respond_to,
            } => {
                let result = self.client.execute(command);
                let _ = respond_to.send(result);
            }
            ClientRequest::Snapshot { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
        }
    }

    fn snapshot(&self) -> Snapshot {
        let history = self.client.history();
        Snapshot {
            phase: self.client.phase(),
            view: self.client.view(),
            panes: Pane::ALL
                .into_iter()
                .map(|pane| (pane, history.entries(pane).iter().cloned().collect()))
                .collect(),
            agents: self.client.directory().agents().to_vec(),
            sessions: self.client.directory().sessions().to_vec(),
            directory_loaded: self.client.directory().is_loaded(),
        }
    }

    fn publish(&mut self) {
        for update in self.client.drain_updates() {
            // No subscribers is fine.
            let _ = self.updates.send(update);
        }
    }
}
