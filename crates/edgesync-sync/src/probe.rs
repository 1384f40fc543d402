//! # Network Probe
//!
//! Cheap reachability check that gates a whole cycle.
//!
//! ## Probe Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        TcpProbe::is_online()                            │
//! │                                                                         │
//! │  www.google.com:80      ── connect ≤ 1s ── ok? ──► online              │
//! │        │ fail                                                           │
//! │        ▼                                                                │
//! │  www.cloudflare.com:80  ── connect ≤ 1s ── ok? ──► online              │
//! │        │ fail                                                           │
//! │        ▼                                                                │
//! │  www.amazon.com:80      ── connect ≤ 1s ── ok? ──► online              │
//! │        │ fail                                                           │
//! │        ▼                                                                │
//! │     offline (cycle postponed, nothing else contacted)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The connection is dropped as soon as it is established; no bytes are
//! sent.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::ProbeSettings;

/// Answers "is the internet reachable right now".
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Raw TCP connect probe against a fixed host list.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    hosts: Vec<String>,
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(hosts: Vec<String>, port: u16, timeout: Duration) -> Self {
        TcpProbe {
            hosts,
            port,
            timeout,
        }
    }

    pub fn from_settings(settings: &ProbeSettings) -> Self {
        Self::new(
            settings.hosts.clone(),
            settings.port,
            Duration::from_millis(settings.timeout_ms),
        )
    }
}

#[async_trait]
impl NetworkProbe for TcpProbe {
    async fn is_online(&self) -> bool {
        for host in &self.hosts {
            let target = (host.as_str(), self.port);
            match timeout(self.timeout, TcpStream::connect(target)).await {
                Ok(Ok(_stream)) => {
                    debug!(host = %host, "Connectivity probe succeeded");
                    return true;
                }
                Ok(Err(e)) => debug!(host = %host, error = %e, "Probe connect failed"),
                Err(_) => debug!(host = %host, "Probe connect timed out"),
            }
        }

        warn!(hosts = self.hosts.len(), "No probe host reachable");
        false
    }
}

/// Probe with a scripted answer. Counts how often it was asked.
#[derive(Debug, Default)]
pub struct StaticProbe {
    online: bool,
    calls: AtomicUsize,
}

impl StaticProbe {
    pub fn online() -> Self {
        StaticProbe {
            online: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn offline() -> Self {
        StaticProbe {
            online: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `is_online` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NetworkProbe for StaticProbe {
    async fn is_online(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.online
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_probe_reaches_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = TcpProbe::new(vec!["127.0.0.1".into()], port, Duration::from_millis(500));
        assert!(probe.is_online().await);
    }

    #[tokio::test]
    async fn test_tcp_probe_falls_through_to_later_host() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = TcpProbe::new(
            vec!["host.invalid".into(), "127.0.0.1".into()],
            port,
            Duration::from_millis(500),
        );
        assert!(probe.is_online().await);
    }

    #[tokio::test]
    async fn test_tcp_probe_offline_when_all_fail() {
        // Bind then drop so the port is known to be closed
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = TcpProbe::new(vec!["127.0.0.1".into()], port, Duration::from_millis(500));
        assert!(!probe.is_online().await);
    }

    #[tokio::test]
    async fn test_static_probe_counts_calls() {
        let probe = StaticProbe::offline();
        assert!(!probe.is_online().await);
        assert!(!probe.is_online().await);
        assert_eq!(probe.calls(), 2);
    }
}
