//! # Call Status Core
//!
//! Event correlation engine for the Asterisk Manager Interface (AMI).
//!
//! The PBX reports calls as a flat stream of per-channel events. This crate
//! groups them into calls, resolves caller names through the PBX's own
//! key/value store over the same session, and produces a single textual
//! status snapshot per `Status` collection cycle.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  RawEvent   ┌──────────────────┐  StatusSnapshot  ┌─────────────────┐
//! │  transport   │────────────▶│ CallStatusEngine │─────────────────▶│ StatusPublisher │
//! │ (AMI socket) │◀────────────│  state machine   │                  └─────────────────┘
//! └──────────────┘ Status/DBGet└────────┬─────────┘
//!                                       │
//!                      ┌────────────────┼────────────────┐
//!                      ▼                ▼                ▼
//!                 call_graph        resolver          channel
//! ```
//!
//! Nothing here performs I/O: the transport and the publisher are traits so
//! the engine can be driven from any event source.

pub mod call_graph;
pub mod channel;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod event;
pub mod publisher;
pub mod resolver;
pub mod transport;

pub use call_graph::{build_snapshot, CallRecord, StatusSnapshot, IDLE_STATUS};
pub use channel::display_name;
pub use connectivity::{ConnectivityFlag, ConnectivityObserver};
pub use engine::{CallStatusEngine, EngineConfig, SessionState};
pub use error::{EngineError, Result, TransportError};
pub use event::{AmiEvent, CallStateChange, ChannelEvent, RawEvent, UNKNOWN_CALLER_NAME};
pub use publisher::{ChannelPublisher, LogPublisher, MultiPublisher, StatusPublisher, WatchPublisher};
pub use resolver::{CallerIdCache, CallerIdResolver};
pub use transport::SessionTransport;
