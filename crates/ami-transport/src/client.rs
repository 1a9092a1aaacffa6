//! AMI client over TCP
//!
//! One reader task decodes inbound blocks: events go to the event channel,
//! responses are matched to their action by `ActionID`. One writer task owns
//! the write half so actions can be queued from synchronous code.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use callstatus_core::{RawEvent, SessionTransport, TransportError};

use crate::codec::{parse_message, read_block, AmiAction, AmiMessage, AmiResponse};
use crate::error::{AmiError, Result};

/// Default AMI port
pub const DEFAULT_AMI_PORT: u16 = 5038;

const BANNER_PREFIX: &str = "Asterisk Call Manager";
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Connection parameters for one management session.
#[derive(Debug, Clone)]
pub struct AmiConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub secret: String,
    pub connect_timeout: Duration,
    /// How long `login` and other awaited actions wait for their response
    pub response_timeout: Duration,
}

impl AmiConfig {
    pub fn new(host: impl Into<String>, username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_AMI_PORT,
            username: username.into(),
            secret: secret.into(),
            connect_timeout: Duration::from_secs(10),
            response_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// What the reader task hands to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Event(RawEvent),
    /// The connection is gone; no further events follow.
    Closed,
}

enum PendingAction {
    Awaiting(oneshot::Sender<AmiResponse>),
    FireAndForget(String),
}

struct AmiClientInner {
    writer_tx: mpsc::UnboundedSender<String>,
    next_action_id: AtomicU64,
    pending: DashMap<String, PendingAction>,
    closed: AtomicBool,
    cancel: CancellationToken,
    banner: String,
    peer: String,
    response_timeout: Duration,
}

/// Handle to a live AMI session. Cheap to clone.
#[derive(Clone)]
pub struct AmiClient {
    inner: Arc<AmiClientInner>,
}

impl std::fmt::Debug for AmiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmiClient")
            .field("peer", &self.inner.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl AmiClient {
    /// Open the TCP connection and read the banner.
    ///
    /// Returns the client and the receiver of inbound events. The session is
    /// not authenticated yet; call [`login`](Self::login) next.
    pub async fn connect(config: &AmiConfig) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let address = config.address();
        debug!("Connecting to AMI at {}", address);

        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| AmiError::ConnectTimeout(address.clone()))??;

        let (read_half, write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let mut banner = String::new();
        let read = tokio::time::timeout(config.response_timeout, reader.read_line(&mut banner))
            .await
            .map_err(|_| AmiError::ResponseTimeout("banner".to_string()))??;
        if read == 0 {
            return Err(AmiError::Closed);
        }
        let banner = banner.trim_end().to_string();
        if !banner.starts_with(BANNER_PREFIX) {
            return Err(AmiError::Protocol(format!("unexpected banner: {:?}", banner)));
        }
        info!("Connected to {} ({})", address, banner);

        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let client = AmiClient {
            inner: Arc::new(AmiClientInner {
                writer_tx,
                next_action_id: AtomicU64::new(1),
                pending: DashMap::new(),
                closed: AtomicBool::new(false),
                cancel: CancellationToken::new(),
                banner,
                peer: address,
                response_timeout: config.response_timeout,
            }),
        };

        client.spawn_write_loop(write_half, writer_rx);
        client.spawn_receive_loop(reader, events_tx);

        Ok((client, events_rx))
    }

    /// Connect and authenticate in one step.
    pub async fn connect_and_login(config: &AmiConfig) -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let (client, events) = Self::connect(config).await?;
        if let Err(e) = client.login(&config.username, &config.secret).await {
            client.close();
            return Err(e);
        }
        Ok((client, events))
    }

    /// Authenticate with event delivery turned on.
    pub async fn login(&self, username: &str, secret: &str) -> Result<()> {
        let response = self.send_action_awaiting(AmiAction::login(username, secret)).await?;
        if !response.is_success() {
            let reason = response.message.unwrap_or_else(|| response.status.clone());
            warn!("AMI login as {} rejected: {}", username, reason);
            return Err(AmiError::LoginFailed(reason));
        }
        info!("Logged in to AMI as {}", username);
        Ok(())
    }

    /// Queue an action without waiting for its response.
    ///
    /// Returns the `ActionID` assigned to it. An error response is logged
    /// when it arrives.
    pub fn send_action(&self, action: AmiAction) -> Result<String> {
        let name = action.name().to_string();
        self.enqueue(action, PendingAction::FireAndForget(name))
    }

    /// Send an action and wait for its response.
    pub async fn send_action_awaiting(&self, action: AmiAction) -> Result<AmiResponse> {
        let name = action.name().to_string();
        let (tx, rx) = oneshot::channel();
        let action_id = self.enqueue(action, PendingAction::Awaiting(tx))?;

        match tokio::time::timeout(self.inner.response_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(AmiError::Closed),
            Err(_) => {
                self.inner.pending.remove(&action_id);
                Err(AmiError::ResponseTimeout(name))
            }
        }
    }

    /// Say goodbye to the PBX, then close the connection.
    pub async fn logoff(&self) -> Result<()> {
        let result = self.send_action_awaiting(AmiAction::logoff()).await;
        self.close();
        match result {
            Ok(response) => {
                debug!("Logoff answered with {}", response.status);
                Ok(())
            }
            Err(AmiError::Closed) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Stop both tasks. The receiver gets [`TransportEvent::Closed`].
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            debug!("Closing AMI connection to {}", self.inner.peer);
        }
        self.inner.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Relaxed)
    }

    pub fn banner(&self) -> &str {
        &self.inner.banner
    }

    pub fn peer(&self) -> &str {
        &self.inner.peer
    }

    /// Actions sent and not yet answered
    pub fn pending_actions(&self) -> usize {
        self.inner.pending.len()
    }

    fn enqueue(&self, action: AmiAction, pending: PendingAction) -> Result<String> {
        if self.is_closed() {
            return Err(AmiError::Closed);
        }

        let action_id = self.inner.next_action_id.fetch_add(1, Ordering::Relaxed).to_string();
        let wire = action.to_wire(&action_id);
        self.inner.pending.insert(action_id.clone(), pending);

        if self.inner.writer_tx.send(wire).is_err() {
            self.inner.pending.remove(&action_id);
            return Err(AmiError::Closed);
        }
        trace!("Queued {} action {}", action.name(), action_id);
        Ok(action_id)
    }

    fn spawn_write_loop(&self, mut write_half: OwnedWriteHalf, mut writer_rx: mpsc::UnboundedReceiver<String>) {
        let client = self.clone();

        tokio::spawn(async move {
            loop {
                let wire = tokio::select! {
                    _ = client.inner.cancel.cancelled() => break,
                    next = writer_rx.recv() => match next {
                        Some(wire) => wire,
                        None => break,
                    },
                };

                if let Err(e) = write_half.write_all(wire.as_bytes()).await {
                    error!("Error writing to AMI connection: {}", e);
                    client.close();
                    break;
                }
            }

            let _ = write_half.shutdown().await;
            debug!("AMI write loop terminated");
        });
    }

    fn spawn_receive_loop(&self, mut reader: BufReader<OwnedReadHalf>, events_tx: mpsc::Sender<TransportEvent>) {
        let client = self.clone();

        tokio::spawn(async move {
            let inner = &client.inner;

            loop {
                let block = tokio::select! {
                    _ = inner.cancel.cancelled() => break,
                    block = read_block(&mut reader) => block,
                };

                let lines = match block {
                    Ok(Some(lines)) => lines,
                    Ok(None) => {
                        info!("AMI connection closed by {}", inner.peer);
                        break;
                    }
                    Err(e) => {
                        if !client.is_closed() {
                            error!("Error reading from AMI connection: {}", e);
                        }
                        break;
                    }
                };

                match parse_message(&lines) {
                    Ok(AmiMessage::Event(event)) => {
                        if events_tx.send(TransportEvent::Event(event)).await.is_err() {
                            debug!("Event receiver dropped, stopping AMI receive loop");
                            break;
                        }
                    }
                    Ok(AmiMessage::Response(response)) => client.complete_action(response),
                    Err(e) => warn!("Skipping undecodable AMI message: {}", e),
                }
            }

            client.close();
            // Dropping the senders fails every awaiting caller with `Closed`.
            inner.pending.clear();
            let _ = events_tx.send(TransportEvent::Closed).await;
            info!("AMI receive loop terminated");
        });
    }

    fn complete_action(&self, response: AmiResponse) {
        let Some(action_id) = response.action_id.clone() else {
            trace!("Response without ActionID: {}", response.status);
            return;
        };

        match self.inner.pending.remove(&action_id).map(|(_, pending)| pending) {
            Some(PendingAction::Awaiting(tx)) => {
                let _ = tx.send(response);
            }
            Some(PendingAction::FireAndForget(name)) => {
                if response.is_success() {
                    trace!("{} action {} succeeded", name, action_id);
                } else {
                    let message = response.message.as_deref().unwrap_or("");
                    if name == "DBGet" {
                        // A missing database entry is an ordinary outcome
                        debug!("DBGet action {} failed: {}", action_id, message);
                    } else {
                        warn!("{} action {} failed: {}", name, action_id, message);
                    }
                }
            }
            None => trace!("Response for unknown action {}", action_id),
        }
    }
}

impl SessionTransport for AmiClient {
    fn send_status_request(&self) -> std::result::Result<(), TransportError> {
        self.send_action(AmiAction::status())
            .map(|_| ())
            .map_err(|e| e.into_transport_error("Status"))
    }

    fn send_lookup_request(&self, family: &str, key: &str) -> std::result::Result<(), TransportError> {
        self.send_action(AmiAction::db_get(family, key))
            .map(|_| ())
            .map_err(|e| e.into_transport_error("DBGet"))
    }
}
