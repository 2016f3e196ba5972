use std::collections::HashMap;
use tracing::debug;

use crate::session::store::{SessionData, SessionStore, short_id};

/// Session payload key holding the destination cluster connection string
pub const CONNECTION_STRING_KEY: &str = "connection_string";
/// Session payload key holding the progress endpoint URL
pub const ENDPOINT_URL_KEY: &str = "endpoint_url";

/// Build the payload stored when a user submits credentials
pub fn credential_payload(connection_string: Option<&str>, endpoint_url: Option<&str>) -> SessionData {
    let mut data = HashMap::new();
    if let Some(cs) = connection_string.filter(|s| !s.is_empty()) {
        data.insert(CONNECTION_STRING_KEY.to_string(), cs.to_string());
    }
    if let Some(url) = endpoint_url.filter(|s| !s.is_empty()) {
        data.insert(ENDPOINT_URL_KEY.to_string(), url.to_string());
    }
    data
}

/// Resolves per-request credentials: values configured for the whole process win,
/// otherwise they come from the caller's session.
pub struct CredentialResolver<'a> {
    store: &'a SessionStore,
    connection_string: Option<&'a str>,
    endpoint_url: Option<&'a str>,
}

impl<'a> CredentialResolver<'a> {
    pub fn new(
        store: &'a SessionStore,
        connection_string: Option<&'a str>,
        endpoint_url: Option<&'a str>,
    ) -> Self {
        Self {
            store,
            connection_string: connection_string.filter(|s| !s.is_empty()),
            endpoint_url: endpoint_url.filter(|s| !s.is_empty()),
        }
    }

    pub fn connection_string(&self, session_id: Option<&str>) -> Option<String> {
        self.resolve(self.connection_string, CONNECTION_STRING_KEY, session_id)
    }

    pub fn endpoint_url(&self, session_id: Option<&str>) -> Option<String> {
        self.resolve(self.endpoint_url, ENDPOINT_URL_KEY, session_id)
    }

    fn resolve(&self, configured: Option<&str>, key: &str, session_id: Option<&str>) -> Option<String> {
        if let Some(value) = configured {
            return Some(value.to_string());
        }
        let session_id = session_id?;
        let value = self.store.get(session_id)?.remove(key);
        if value.is_none() {
            debug!("Session {}... has no {}", short_id(session_id), key);
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_payload_skips_empty_values() {
        let data = credential_payload(Some("mongodb://h"), Some(""));
        assert_eq!(data.len(), 1);
        assert_eq!(data.get(CONNECTION_STRING_KEY).map(String::as_str), Some("mongodb://h"));
    }

    #[test]
    fn test_configured_value_wins() {
        let store = SessionStore::new(Duration::from_secs(60));
        let id = store.create(credential_payload(Some("mongodb://session"), None));
        let resolver = CredentialResolver::new(&store, Some("mongodb://env"), None);
        assert_eq!(resolver.connection_string(Some(&id)).as_deref(), Some("mongodb://env"));
        assert_eq!(resolver.endpoint_url(Some(&id)), None);
    }

    #[test]
    fn test_session_value_used_without_configuration() {
        let store = SessionStore::new(Duration::from_secs(60));
        let id = store.create(credential_payload(
            Some("mongodb://session"),
            Some("localhost:27182/api/v1/progress"),
        ));
        let resolver = CredentialResolver::new(&store, Some(""), None);
        assert_eq!(resolver.connection_string(Some(&id)).as_deref(), Some("mongodb://session"));
        assert_eq!(
            resolver.endpoint_url(Some(&id)).as_deref(),
            Some("localhost:27182/api/v1/progress")
        );
        assert_eq!(resolver.connection_string(None), None);
        assert_eq!(resolver.connection_string(Some("unknown")), None);
    }
}
