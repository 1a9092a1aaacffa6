//! Caller ID resolution
//!
//! Turns the PBX key/value lookup (`DBGet` / `DBGetResponse`) into a
//! non-blocking read-through cache. A miss sends one lookup and immediately
//! returns the raw key; the answer lands in the cache whenever its event
//! arrives and is picked up by the next resolution of the same key.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::transport::SessionTransport;

/// How long an unanswered lookup blocks a new request for the same key.
pub const DEFAULT_LOOKUP_RETRY: Duration = Duration::from_secs(5);

/// Lookup key (number or extension) to display name.
#[derive(Debug, Clone, Default)]
pub struct CallerIdCache {
    names: HashMap<String, String>,
}

impl CallerIdCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.names.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.names.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, name: impl Into<String>) {
        self.names.insert(key.into(), name.into());
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn clear(&mut self) {
        self.names.clear();
    }
}

pub struct CallerIdResolver {
    /// DB family to query; `None` disables lookups entirely
    family: Option<String>,
    transport: Arc<dyn SessionTransport>,
    cache: CallerIdCache,
    /// Keys with a lookup in flight and when it was sent
    pending: HashMap<String, Instant>,
    retry_after: Duration,
}

impl CallerIdResolver {
    pub fn new(family: Option<String>, transport: Arc<dyn SessionTransport>) -> Self {
        Self {
            family: family.filter(|f| !f.is_empty()),
            transport,
            cache: CallerIdCache::new(),
            pending: HashMap::new(),
            retry_after: DEFAULT_LOOKUP_RETRY,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = retry_after;
        self
    }

    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn cache(&self) -> &CallerIdCache {
        &self.cache
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Display value for `key`.
    ///
    /// Never waits on the network: returns the cached name when known,
    /// otherwise `key` itself, after queuing a lookup if none is outstanding.
    pub fn resolve(&mut self, key: &str) -> String {
        if let Some(name) = self.cache.get(key) {
            return name.to_string();
        }

        let Some(family) = self.family.as_deref() else {
            return key.to_string();
        };
        if key.is_empty() {
            return String::new();
        }

        if let Some(sent_at) = self.pending.get(key) {
            if sent_at.elapsed() < self.retry_after {
                trace!("Lookup for {} already in flight", key);
                return key.to_string();
            }
            debug!("Lookup for {} unanswered after {:?}, retrying", key, self.retry_after);
        }

        match self.transport.send_lookup_request(family, key) {
            Ok(()) => {
                debug!("Requested caller ID for {} from {}", key, family);
                self.pending.insert(key.to_string(), Instant::now());
            }
            Err(e) => {
                warn!("Caller ID lookup for {} failed: {}", key, e);
                self.pending.remove(key);
            }
        }

        key.to_string()
    }

    /// Store the answer to an earlier lookup.
    pub fn on_lookup_response(&mut self, family: Option<&str>, key: &str, value: &str) {
        self.pending.remove(key);

        if let (Some(expected), Some(got)) = (self.family.as_deref(), family) {
            if expected != got {
                debug!("Ignoring lookup response for {}/{} (expected family {})", got, key, expected);
                return;
            }
        }
        if value.is_empty() {
            debug!("Empty caller ID for {}, not caching", key);
            return;
        }

        debug!("Caller ID resolved: {} -> {}", key, value);
        self.cache.insert(key, value);
    }

    /// Remember a name the PBX already told us, unless the key is known.
    /// Returns whether the cache changed.
    pub fn learn(&mut self, key: &str, name: &str) -> bool {
        if key.is_empty() || self.cache.contains(key) {
            return false;
        }
        trace!("Learned caller ID {} -> {}", key, name);
        self.cache.insert(key, name);
        self.pending.remove(key);
        true
    }

    /// Drop every cached name and outstanding lookup.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        lookups: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl SessionTransport for RecordingTransport {
        fn send_status_request(&self) -> Result<(), TransportError> {
            Ok(())
        }

        fn send_lookup_request(&self, family: &str, key: &str) -> Result<(), TransportError> {
            if self.fail {
                return Err(TransportError::NotConnected);
            }
            self.lookups
                .lock()
                .unwrap()
                .push((family.to_string(), key.to_string()));
            Ok(())
        }
    }

    fn resolver(family: Option<&str>) -> (CallerIdResolver, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        let resolver = CallerIdResolver::new(family.map(str::to_string), transport.clone());
        (resolver, transport)
    }

    #[test]
    fn test_miss_returns_key_and_requests_once() {
        let (mut resolver, transport) = resolver(Some("cidname"));

        assert_eq!(resolver.resolve("100"), "100");
        assert_eq!(resolver.resolve("100"), "100");
        assert_eq!(resolver.resolve("100"), "100");

        let lookups = transport.lookups.lock().unwrap();
        assert_eq!(*lookups, vec![("cidname".to_string(), "100".to_string())]);
        assert_eq!(resolver.pending_count(), 1);
    }

    #[test]
    fn test_response_populates_cache() {
        let (mut resolver, _transport) = resolver(Some("cidname"));

        resolver.resolve("100");
        resolver.on_lookup_response(Some("cidname"), "100", "Reception");

        assert_eq!(resolver.resolve("100"), "Reception");
        assert_eq!(resolver.pending_count(), 0);
    }

    #[test]
    fn test_unanswered_lookup_is_retried_after_timeout() {
        let (resolver, transport) = resolver(Some("cidname"));
        let mut resolver = resolver.with_retry_after(Duration::ZERO);

        resolver.resolve("100");
        resolver.resolve("100");

        assert_eq!(transport.lookups.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_no_family_never_requests() {
        let (mut resolver, transport) = resolver(None);

        assert_eq!(resolver.resolve("100"), "100");
        assert!(transport.lookups.lock().unwrap().is_empty());

        resolver.learn("100", "Reception");
        assert_eq!(resolver.resolve("100"), "Reception");
    }

    #[test]
    fn test_send_failure_is_not_remembered() {
        let transport = Arc::new(RecordingTransport {
            fail: true,
            ..Default::default()
        });
        let mut resolver = CallerIdResolver::new(Some("cidname".to_string()), transport);

        assert_eq!(resolver.resolve("100"), "100");
        assert_eq!(resolver.pending_count(), 0);
        assert!(resolver.cache().is_empty());
    }

    #[test]
    fn test_learn_does_not_overwrite() {
        let (mut resolver, _transport) = resolver(Some("cidname"));

        assert!(resolver.learn("100", "Alice"));
        assert!(!resolver.learn("100", "Bob"));
        assert_eq!(resolver.resolve("100"), "Alice");
    }

    #[test]
    fn test_response_for_other_family_is_ignored() {
        let (mut resolver, _transport) = resolver(Some("cidname"));

        resolver.on_lookup_response(Some("blacklist"), "100", "1");
        assert!(!resolver.cache().contains("100"));
    }
}
