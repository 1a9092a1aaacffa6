//! # Call Status AMI
//!
//! Asterisk Manager Interface client used as the session transport of
//! [`callstatus_core::CallStatusEngine`].
//!
//! ```no_run
//! # async fn run() -> Result<(), callstatus_ami::AmiError> {
//! use callstatus_ami::{AmiClient, AmiConfig, TransportEvent};
//!
//! let config = AmiConfig::new("127.0.0.1", "monitor", "secret");
//! let (client, mut events) = AmiClient::connect_and_login(&config).await?;
//!
//! while let Some(TransportEvent::Event(event)) = events.recv().await {
//!     println!("{}", event.name());
//! }
//! client.close();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod error;

pub use client::{AmiClient, AmiConfig, TransportEvent, DEFAULT_AMI_PORT};
pub use codec::{AmiAction, AmiMessage, AmiResponse};
pub use error::{AmiError, Result};
