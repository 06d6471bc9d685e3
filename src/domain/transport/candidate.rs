//! Candidate WebSocket servers and weighted failover selection

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Health of a candidate server as seen by the transport controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerHealth {
    /// Not tried since the last reset
    Idle,
    /// Connected successfully
    Ready,
    /// Was connected, link dropped
    Disconnected,
    /// Connection failed; skipped by selection until the next recovery cycle
    Error,
}

/// One configured transport endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateServer {
    /// `ws://` or `wss://` URI as configured
    pub uri: String,
    pub weight: u32,
    /// `WS` or `WSS`
    pub scheme: String,
    /// `<sip:host[:port];transport=ws;lr>`
    pub sip_uri: String,
    pub health: ServerHealth,
}

impl CandidateServer {
    pub fn new(uri: &str, scheme: &str, host: &str, port: Option<u16>, weight: u32) -> Self {
        let host_port = match port {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        Self {
            uri: uri.to_string(),
            weight,
            scheme: scheme.to_ascii_uppercase(),
            sip_uri: format!("<sip:{};transport=ws;lr>", host_port),
            health: ServerHealth::Idle,
        }
    }
}

impl fmt::Display for CandidateServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (weight {})", self.uri, self.weight)
    }
}

/// Ordered set of candidate servers. Entries are never removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerPool {
    servers: Vec<CandidateServer>,
}

impl ServerPool {
    pub fn new(servers: Vec<CandidateServer>) -> Self {
        Self { servers }
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CandidateServer> {
        self.servers.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CandidateServer> {
        self.servers.iter()
    }

    pub fn set_health(&mut self, index: usize, health: ServerHealth) {
        if let Some(server) = self.servers.get_mut(index) {
            debug!("Server {} health {:?} -> {:?}", server.uri, server.health, health);
            server.health = health;
        }
    }

    /// Start of a recovery cycle: every server becomes eligible again.
    pub fn reset_health(&mut self) {
        for server in self.servers.iter_mut() {
            server.health = ServerHealth::Idle;
        }
    }

    /// Pick the next server to try.
    ///
    /// Servers in `Error` are skipped; among the rest only those with the
    /// highest weight are kept, and one of them is drawn uniformly.
    pub fn select<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<usize> {
        let mut candidates: Vec<usize> = Vec::new();

        for (index, server) in self.servers.iter().enumerate() {
            if server.health == ServerHealth::Error {
                continue;
            }
            match candidates.first().map(|&first| self.servers[first].weight) {
                None => candidates.push(index),
                Some(best) if server.weight > best => candidates = vec![index],
                Some(best) if server.weight == best => candidates.push(index),
                Some(_) => {}
            }
        }

        if candidates.is_empty() {
            return None;
        }
        Some(candidates[rng.gen_range(0..candidates.len())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn server(name: &str, weight: u32) -> CandidateServer {
        CandidateServer::new(&format!("wss://{}", name), "wss", name, None, weight)
    }

    #[test]
    fn test_sip_uri_form() {
        let s = CandidateServer::new("ws://edge.example.com:8080/ws", "ws", "edge.example.com", Some(8080), 0);
        assert_eq!(s.sip_uri, "<sip:edge.example.com:8080;transport=ws;lr>");
        assert_eq!(s.scheme, "WS");
        assert_eq!(s.health, ServerHealth::Idle);
    }

    #[test]
    fn test_highest_weight_wins() {
        let pool = ServerPool::new(vec![server("a", 1), server("b", 2), server("c", 0)]);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            assert_eq!(pool.select(&mut rng), Some(1));
        }
    }

    #[test]
    fn test_errored_server_is_skipped() {
        let mut pool = ServerPool::new(vec![server("a", 2), server("b", 1)]);
        pool.set_health(0, ServerHealth::Error);
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..50 {
            assert_eq!(pool.select(&mut rng), Some(1));
        }
    }

    #[test]
    fn test_all_errored_yields_none() {
        let mut pool = ServerPool::new(vec![server("a", 0), server("b", 0)]);
        pool.set_health(0, ServerHealth::Error);
        pool.set_health(1, ServerHealth::Error);
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(pool.select(&mut rng), None);

        pool.reset_health();
        assert!(pool.select(&mut rng).is_some());
    }

    #[test]
    fn test_ties_are_drawn_from_every_member() {
        let pool = ServerPool::new(vec![server("a", 3), server("b", 3), server("c", 1)]);
        let mut rng = StdRng::seed_from_u64(4);
        let mut seen = [false; 3];
        for _ in 0..200 {
            seen[pool.select(&mut rng).unwrap()] = true;
        }
        assert_eq!(seen, [true, true, false]);
    }

    fn health_strategy() -> impl Strategy<Value = ServerHealth> {
        prop_oneof![
            Just(ServerHealth::Idle),
            Just(ServerHealth::Ready),
            Just(ServerHealth::Disconnected),
            Just(ServerHealth::Error),
        ]
    }

    proptest! {
        #[test]
        fn prop_never_selects_errored(
            entries in proptest::collection::vec((0u32..4, health_strategy()), 1..8),
            seed in any::<u64>(),
        ) {
            let mut pool = ServerPool::new(
                entries.iter().enumerate().map(|(i, (w, _))| server(&format!("s{}", i), *w)).collect(),
            );
            for (i, (_, health)) in entries.iter().enumerate() {
                pool.set_health(i, *health);
            }
            let mut rng = StdRng::seed_from_u64(seed);
            match pool.select(&mut rng) {
                Some(index) => prop_assert_ne!(pool.get(index).unwrap().health, ServerHealth::Error),
                None => prop_assert!(pool.iter().all(|s| s.health == ServerHealth::Error)),
            }
        }

        #[test]
        fn prop_single_healthy_server_always_chosen(
            weights in proptest::collection::vec(0u32..4, 1..8),
            healthy in any::<prop::sample::Index>(),
            seed in any::<u64>(),
        ) {
            let healthy = healthy.index(weights.len());
            let mut pool = ServerPool::new(
                weights.iter().enumerate().map(|(i, w)| server(&format!("s{}", i), *w)).collect(),
            );
            for i in 0..weights.len() {
                if i != healthy {
                    pool.set_health(i, ServerHealth::Error);
                }
            }
            let mut rng = StdRng::seed_from_u64(seed);
            prop_assert_eq!(pool.select(&mut rng), Some(healthy));
        }
    }
}
