//! Per-realm authentication cache
//!
//! Holds the last digest state accepted for a (realm, request-URI) pair so
//! follow-up requests can pre-authenticate. Computing digests is the job of
//! the authentication collaborator; this store only remembers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub realm: String,
    pub uri: String,
    pub username: String,
    pub nonce: String,
    pub opaque: Option<String>,
    pub algorithm: String,
    pub nc: u32,
    /// Method of the request the credentials were last handed out for
    pub method: Option<String>,
}

#[derive(Debug, Default)]
pub struct CredentialStore {
    by_realm: HashMap<String, HashMap<String, Credentials>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&mut self, credentials: Credentials) {
        debug!(
            "Caching credentials for realm {} uri {}",
            credentials.realm, credentials.uri
        );
        self.by_realm
            .entry(credentials.realm.clone())
            .or_default()
            .insert(credentials.uri.clone(), credentials);
    }

    /// Look up by realm (the request-URI host) then by the full request-URI,
    /// stamping the returned copy with `method`.
    pub fn get(&self, realm: &str, uri: &str, method: &str) -> Option<Credentials> {
        self.by_realm
            .get(realm)
            .and_then(|by_uri| by_uri.get(uri))
            .map(|credentials| Credentials {
                method: Some(method.to_string()),
                ..credentials.clone()
            })
    }

    pub fn len(&self) -> usize {
        self.by_realm.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials(realm: &str, uri: &str) -> Credentials {
        Credentials {
            realm: realm.to_string(),
            uri: uri.to_string(),
            username: "alice".to_string(),
            nonce: "abc".to_string(),
            opaque: None,
            algorithm: "MD5".to_string(),
            nc: 1,
            method: None,
        }
    }

    #[test]
    fn test_save_and_get() {
        let mut store = CredentialStore::new();
        store.save(credentials("example.com", "sip:bob@example.com"));

        let found = store
            .get("example.com", "sip:bob@example.com", "INVITE")
            .unwrap();
        assert_eq!(found.username, "alice");
        assert_eq!(found.method.as_deref(), Some("INVITE"));

        assert!(store.get("example.com", "sip:carol@example.com", "INVITE").is_none());
        assert!(store.get("other.com", "sip:bob@example.com", "INVITE").is_none());
    }

    #[test]
    fn test_save_overwrites_same_key() {
        let mut store = CredentialStore::new();
        store.save(credentials("example.com", "sip:bob@example.com"));
        let mut newer = credentials("example.com", "sip:bob@example.com");
        newer.nc = 2;
        store.save(newer);

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("example.com", "sip:bob@example.com", "BYE").unwrap().nc, 2);
    }
}
