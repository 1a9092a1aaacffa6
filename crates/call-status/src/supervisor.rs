//! Connection supervisor
//!
//! Owns the engine for the whole process and keeps a management session
//! open: connect, log in, request status, feed every event to the engine,
//! refresh periodically, reconnect when the session drops.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use callstatus_ami::{AmiClient, AmiConfig, TransportEvent};
use callstatus_core::{
    CallStatusEngine, EngineConfig, SessionTransport, StatusPublisher, TransportError,
};

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub ami: AmiConfig,
    pub reconnect_interval: Duration,
    pub status_refresh_interval: Duration,
    /// How long to wait for `FullyBooted` after login before warning
    pub ready_timeout: Duration,
}

/// The engine's view of whatever session is currently open.
#[derive(Default)]
pub struct SharedTransport {
    client: RwLock<Option<AmiClient>>,
}

impl SharedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, client: AmiClient) {
        *self.client.write() = Some(client);
    }

    pub fn detach(&self) -> Option<AmiClient> {
        self.client.write().take()
    }

    pub fn is_attached(&self) -> bool {
        self.client.read().is_some()
    }

    fn current(&self) -> Result<AmiClient, TransportError> {
        self.client.read().clone().ok_or(TransportError::NotConnected)
    }
}

impl SessionTransport for SharedTransport {
    fn send_status_request(&self) -> Result<(), TransportError> {
        self.current()?.send_status_request()
    }

    fn send_lookup_request(&self, family: &str, key: &str) -> Result<(), TransportError> {
        self.current()?.send_lookup_request(family, key)
    }
}

enum SessionEnd {
    Shutdown,
    Lost,
}

pub struct Supervisor {
    config: SupervisorConfig,
    engine: CallStatusEngine,
    transport: Arc<SharedTransport>,
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        engine_config: EngineConfig,
        publisher: Arc<dyn StatusPublisher>,
    ) -> Self {
        let transport = Arc::new(SharedTransport::new());
        let engine = CallStatusEngine::new(engine_config, transport.clone(), publisher);

        Self {
            config,
            engine,
            transport,
        }
    }

    pub fn engine(&self) -> &CallStatusEngine {
        &self.engine
    }

    /// Run until `shutdown` resolves, then log off and tear the engine down.
    pub async fn run<S>(mut self, shutdown: S) -> CallStatusEngine
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            self.engine.mark_connecting();
            info!("Connecting to AMI at {}", self.config.ami.address());

            let session = tokio::select! {
                _ = &mut shutdown => break,
                session = AmiClient::connect_and_login(&self.config.ami) => session,
            };

            match session {
                Ok((client, events)) => {
                    self.transport.attach(client.clone());
                    let end = self.run_session(events, &mut shutdown).await;
                    self.transport.detach();

                    match end {
                        SessionEnd::Shutdown => {
                            if let Err(e) = client.logoff().await {
                                debug!("Logoff failed: {}", e);
                            }
                            break;
                        }
                        SessionEnd::Lost => {
                            client.close();
                            self.engine.connection_lost();
                        }
                    }
                }
                Err(e) => {
                    warn!("AMI connection failed: {}", e);
                    self.engine.connection_lost();
                }
            }

            tokio::select! {
                _ = &mut shutdown => break,
                _ = sleep(self.config.reconnect_interval) => {}
            }
        }

        info!("Shutting down");
        self.engine.teardown();
        self.engine
    }

    async fn run_session<S>(
        &mut self,
        mut events: mpsc::Receiver<TransportEvent>,
        shutdown: &mut Pin<&mut S>,
    ) -> SessionEnd
    where
        S: Future<Output = ()>,
    {
        self.spawn_ready_check();

        if let Err(e) = self.engine.request_status() {
            debug!("Initial status request failed: {}", e);
        }

        let period = self.config.status_refresh_interval;
        let mut refresh = interval_at(Instant::now() + period, period);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.as_mut() => return SessionEnd::Shutdown,
                _ = refresh.tick() => {
                    debug!("Periodic status refresh");
                    if let Err(e) = self.engine.request_status() {
                        debug!("Periodic status request failed: {}", e);
                    }
                }
                event = events.recv() => match event {
                    Some(TransportEvent::Event(raw)) => self.engine.dispatch(&raw),
                    Some(TransportEvent::Closed) | None => return SessionEnd::Lost,
                },
            }
        }
    }

    fn spawn_ready_check(&self) {
        let mut observer = self.engine.connectivity();
        let timeout = self.config.ready_timeout;

        tokio::spawn(async move {
            if !observer.wait_connected(timeout).await {
                warn!("PBX has not reported FullyBooted after {:?}", timeout);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detached_transport_reports_not_connected() {
        let transport = SharedTransport::new();
        assert!(!transport.is_attached());
        assert_eq!(transport.send_status_request(), Err(TransportError::NotConnected));
        assert_eq!(
            transport.send_lookup_request("cidname", "100"),
            Err(TransportError::NotConnected)
        );
    }
}
