//! Session state machine
//!
//! [`CallStatusEngine`] consumes the AMI event stream one event at a time.
//! It tracks whether the PBX is up, buffers the channels reported by a
//! `Status` action until the closing `StatusComplete`, turns that buffer into
//! a [`StatusSnapshot`] and asks for a fresh status whenever a call changes
//! state.
//!
//! ```text
//!                 FullyBooted                 Status
//!  Disconnected ───────────────▶ Connected ───────────▶ Collecting
//!       ▲  ▲                      │  ▲   ▲                  │
//!       │  └── Shutdown / lost ───┘  │   └─ StatusComplete ─┘
//!       │                            │      (snapshot published)
//!       └── Connecting ─ FullyBooted ┘
//! ```
//!
//! The engine is a single-threaded reactor with no locking: hosts receiving
//! events on several threads must serialize calls to [`dispatch`].
//! Every error raised while handling an event stops at [`dispatch`], is
//! logged, and the next event is processed normally.
//!
//! [`dispatch`]: CallStatusEngine::dispatch

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, trace, warn};

use crate::call_graph::{build_snapshot, StatusSnapshot};
use crate::connectivity::{ConnectivityFlag, ConnectivityObserver};
use crate::error::{EngineError, Result};
use crate::event::{AmiEvent, ChannelEvent, RawEvent};
use crate::publisher::StatusPublisher;
use crate::resolver::{CallerIdResolver, DEFAULT_LOOKUP_RETRY};
use crate::transport::SessionTransport;

/// Events too chatty to log above trace level.
const NOISY_EVENTS: &[&str] = &["PeerStatus", "RTCPSent", "VarSet", "Registry"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    /// Host is connecting / logging in
    Connecting,
    Connected,
    /// Inside a `Status` .. `StatusComplete` burst
    Collecting,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// AstDB family holding caller names; `None` disables lookups
    pub lookup_family: Option<String>,
    /// How long an unanswered lookup suppresses a new one for the same key
    pub lookup_retry: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lookup_family: None,
            lookup_retry: DEFAULT_LOOKUP_RETRY,
        }
    }
}

impl EngineConfig {
    pub fn with_lookup_family(mut self, family: impl Into<String>) -> Self {
        self.lookup_family = Some(family.into());
        self
    }

    pub fn with_lookup_retry(mut self, retry: Duration) -> Self {
        self.lookup_retry = retry;
        self
    }
}

pub struct CallStatusEngine {
    state: SessionState,
    connectivity: ConnectivityFlag,
    /// Channels of the current collection cycle, in arrival order
    collection: Vec<ChannelEvent>,
    resolver: CallerIdResolver,
    transport: Arc<dyn SessionTransport>,
    publisher: Arc<dyn StatusPublisher>,
    /// A call changed state mid-collection; re-request once it completes
    refresh_pending: bool,
    cycles_completed: u64,
    torn_down: bool,
}

impl CallStatusEngine {
    pub fn new(
        config: EngineConfig,
        transport: Arc<dyn SessionTransport>,
        publisher: Arc<dyn StatusPublisher>,
    ) -> Self {
        let resolver = CallerIdResolver::new(config.lookup_family, transport.clone())
            .with_retry_after(config.lookup_retry);

        Self {
            state: SessionState::Disconnected,
            connectivity: ConnectivityFlag::new(),
            collection: Vec::new(),
            resolver,
            transport,
            publisher,
            refresh_pending: false,
            cycles_completed: 0,
            torn_down: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.connectivity.get()
    }

    /// Handle for health checks; stays valid for the engine's lifetime.
    pub fn connectivity(&self) -> ConnectivityObserver {
        self.connectivity.observer()
    }

    /// Channels buffered in the current collection cycle
    pub fn collected_count(&self) -> usize {
        self.collection.len()
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed
    }

    pub fn resolver(&self) -> &CallerIdResolver {
        &self.resolver
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Record that the host started connecting and logging in.
    pub fn mark_connecting(&mut self) {
        if !self.torn_down && self.state == SessionState::Disconnected {
            self.state = SessionState::Connecting;
        }
    }

    /// Error boundary for a single inbound event.
    ///
    /// Never fails: a malformed or unexpected event is logged and dropped so
    /// one bad event cannot stall status tracking.
    pub fn dispatch(&mut self, raw: &RawEvent) {
        if NOISY_EVENTS.iter().any(|name| *name == raw.name()) {
            trace!("Event: {}", raw.name());
        } else {
            debug!("Event: {}", raw.name());
        }

        match self.handle_event(raw) {
            Ok(()) => {}
            Err(EngineError::TornDown) => {
                debug!("Ignoring {} event after teardown", raw.name());
            }
            Err(e) => {
                error!(event = raw.name(), state = ?self.state, "Error handling event: {}", e);
            }
        }
    }

    /// Process one event, surfacing the error instead of logging it.
    pub fn handle_event(&mut self, raw: &RawEvent) -> Result<()> {
        if self.torn_down {
            return Err(EngineError::TornDown);
        }

        match AmiEvent::try_from(raw)? {
            AmiEvent::FullyBooted => {
                info!("PBX fully booted, session connected");
                self.connectivity.set(true);
                self.state = SessionState::Connected;
            }

            AmiEvent::Shutdown => {
                warn!("PBX is shutting down");
                self.disconnect();
            }

            AmiEvent::Status(channel) => {
                if self.state != SessionState::Collecting {
                    debug!("Status collection started");
                    self.state = SessionState::Collecting;
                }
                trace!("Collected channel {} ({})", channel.raw_channel_name, channel.unique_id);
                self.collection.push(channel);
            }

            AmiEvent::StatusComplete => {
                self.complete_collection()?;
            }

            AmiEvent::CallStateChanged(change) => match self.state {
                SessionState::Connected | SessionState::Collecting => {
                    debug!("{} changed call topology, refreshing status", change);
                    self.request_status()?;
                }
                SessionState::Disconnected | SessionState::Connecting => {
                    debug!("Ignoring {} while {:?}", change, self.state);
                }
            },

            AmiEvent::DbGetResponse { family, key, value } => {
                self.resolver.on_lookup_response(family.as_deref(), &key, &value);
            }

            AmiEvent::Unrecognized(name) => {
                trace!("Unhandled event type {}", name);
            }
        }

        Ok(())
    }

    /// Ask the PBX for a full status burst.
    ///
    /// While a burst is already being collected the request is deferred
    /// until it completes, so two bursts never interleave in one buffer.
    pub fn request_status(&mut self) -> Result<()> {
        if self.torn_down {
            return Err(EngineError::TornDown);
        }
        if self.state == SessionState::Collecting {
            self.refresh_pending = true;
            return Ok(());
        }

        self.transport.send_status_request().map_err(|e| {
            warn!("Status request failed: {}", e);
            EngineError::from(e)
        })
    }

    /// The transport dropped: same transition as a PBX `Shutdown`.
    pub fn connection_lost(&mut self) {
        if self.torn_down {
            return;
        }
        warn!("Management session lost");
        self.disconnect();
    }

    /// Final shutdown. Discards the collection buffer and the caller ID
    /// cache; any event dispatched afterwards is ignored.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        info!(
            cached_names = self.resolver.cache().len(),
            cycles = self.cycles_completed,
            "Tearing down call status engine"
        );
        self.disconnect();
        self.resolver.clear();
        self.torn_down = true;
    }

    fn disconnect(&mut self) {
        self.connectivity.set(false);
        self.state = SessionState::Disconnected;
        self.refresh_pending = false;
        if !self.collection.is_empty() {
            debug!("Discarding {} collected channel(s)", self.collection.len());
            self.collection.clear();
        }
    }

    fn complete_collection(&mut self) -> Result<()> {
        let channels = mem::take(&mut self.collection);
        let snapshot: StatusSnapshot = build_snapshot(&channels, &mut self.resolver);

        self.state = if self.connectivity.get() {
            SessionState::Connected
        } else {
            SessionState::Disconnected
        };
        self.cycles_completed += 1;

        debug!(
            channels = channels.len(),
            calls = snapshot.call_count(),
            "Status collection complete: {}",
            snapshot.summary_text
        );
        self.publisher.publish(snapshot);

        if mem::take(&mut self.refresh_pending) {
            self.request_status()?;
        }
        Ok(())
    }
}
