//! Outbound side of the management session, as seen by the engine

use crate::error::TransportError;

/// Actions the engine needs to send over the management session.
///
/// Both calls are fire-and-forget: implementations queue the action and
/// return without waiting for the PBX. Responses come back later as events
/// through [`CallStatusEngine::dispatch`](crate::engine::CallStatusEngine::dispatch).
pub trait SessionTransport: Send + Sync {
    /// Ask the PBX to re-emit the full `Status` .. `StatusComplete` sequence.
    fn send_status_request(&self) -> Result<(), TransportError>;

    /// Ask the PBX key/value store for `family/key`; the answer arrives as a
    /// `DBGetResponse` event.
    fn send_lookup_request(&self, family: &str, key: &str) -> Result<(), TransportError>;
}

impl<T: SessionTransport + ?Sized> SessionTransport for std::sync::Arc<T> {
    fn send_status_request(&self) -> Result<(), TransportError> {
        (**self).send_status_request()
    }

    fn send_lookup_request(&self, family: &str, key: &str) -> Result<(), TransportError> {
        (**self).send_lookup_request(family, key)
    }
}
