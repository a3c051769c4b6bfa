//! Proxy manager: pluggable provider trait, sticky sessions, rotation
//! strategies, and cooldown-on-retirement.
//!
//! Provider shape, sticky-session semantics, and per-URL cooldown follow
//! `original_source/src/stealth/proxy_manager.py`; session lifecycle uses
//! `browser_pool`'s `Arc`-shared pattern.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::config::ProxyRotation;

use super::errors::{StealthError, StealthResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProxySessionStatus {
    Active,
    Expired,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySession {
    pub id: String,
    pub proxy_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub status: ProxySessionStatus,
    pub match_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl ProxySession {
    /// Spec §8 monotonicity property: Active -> (Expired | Failed), never
    /// back to Active.
    #[must_use]
    pub fn can_transition_to(&self, next: ProxySessionStatus) -> bool {
        matches!(
            (self.status, next),
            (ProxySessionStatus::Active, ProxySessionStatus::Expired)
                | (ProxySessionStatus::Active, ProxySessionStatus::Failed)
        )
    }
}

#[derive(Debug, Clone)]
pub struct ProviderHealth {
    pub provider: String,
    pub initialized: bool,
    pub available_proxies: usize,
    pub blocked_count: usize,
    pub latency_ms: u64,
}

/// Collaborator interface every concrete proxy vendor implements.
#[async_trait]
pub trait ProxyProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn initialize(&self) -> StealthResult<bool>;
    async fn get_proxy_url(&self) -> StealthResult<Option<String>>;
    async fn mark_exhausted(&self, proxy_url: &str);
    async fn health_check(&self) -> ProviderHealth;
}

/// Bright-Data-style residential proxy provider: one rotating endpoint,
/// session id baked into the username.
pub struct BrightDataProvider {
    host: String,
    port: u16,
    username_prefix: String,
    password: String,
    exhausted: RwLock<Vec<String>>,
}

impl BrightDataProvider {
    #[must_use]
    pub fn new(username_prefix: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: "zproxy.lum-superproxy.io".into(),
            port: 22225,
            username_prefix: username_prefix.into(),
            password: password.into(),
            exhausted: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ProxyProvider for BrightDataProvider {
    fn name(&self) -> &str {
        "bright_data"
    }

    async fn initialize(&self) -> StealthResult<bool> {
        Ok(true)
    }

    async fn get_proxy_url(&self) -> StealthResult<Option<String>> {
        let session_id = Uuid::new_v4().simple().to_string();
        Ok(Some(format!(
            "http://{}-session-{}:{}@{}:{}",
            self.username_prefix, session_id, self.password, self.host, self.port
        )))
    }

    async fn mark_exhausted(&self, proxy_url: &str) {
        self.exhausted.write().push(proxy_url.to_string());
    }

    async fn health_check(&self) -> ProviderHealth {
        ProviderHealth {
            provider: self.name().to_string(),
            initialized: true,
            available_proxies: usize::MAX,
            blocked_count: self.exhausted.read().len(),
            latency_ms: 0,
        }
    }
}

/// OxyLabs-style datacenter proxy provider.
pub struct OxyLabsProvider {
    host: String,
    port: u16,
    username: String,
    password: String,
    exhausted: RwLock<Vec<String>>,
}

impl OxyLabsProvider {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: "pr.oxylabs.io".into(),
            port: 7777,
            username: username.into(),
            password: password.into(),
            exhausted: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ProxyProvider for OxyLabsProvider {
    fn name(&self) -> &str {
        "oxylabs"
    }

    async fn initialize(&self) -> StealthResult<bool> {
        Ok(true)
    }

    async fn get_proxy_url(&self) -> StealthResult<Option<String>> {
        Ok(Some(format!(
            "http://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )))
    }

    async fn mark_exhausted(&self, proxy_url: &str) {
        self.exhausted.write().push(proxy_url.to_string());
    }

    async fn health_check(&self) -> ProviderHealth {
        ProviderHealth {
            provider: self.name().to_string(),
            initialized: true,
            available_proxies: usize::MAX,
            blocked_count: self.exhausted.read().len(),
            latency_ms: 0,
        }
    }
}

/// No-op provider for tests and stealth-disabled runs: returns no proxy
/// URL at all, so the driver never attempts to bind one.
#[derive(Default)]
pub struct MockProxyProvider {
    pool: RwLock<Vec<String>>,
}

impl MockProxyProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pool: RwLock::new(vec![
                "198.51.100.1".into(),
                "198.51.100.2".into(),
                "198.51.100.3".into(),
                "198.51.100.4".into(),
                "198.51.100.5".into(),
            ]),
        }
    }
}

#[async_trait]
impl ProxyProvider for MockProxyProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn initialize(&self) -> StealthResult<bool> {
        Ok(true)
    }

    async fn get_proxy_url(&self) -> StealthResult<Option<String>> {
        Ok(None)
    }

    async fn mark_exhausted(&self, _proxy_url: &str) {}

    async fn health_check(&self) -> ProviderHealth {
        ProviderHealth {
            provider: self.name().to_string(),
            initialized: true,
            available_proxies: self.pool.read().len(),
            blocked_count: 0,
            latency_ms: 0,
        }
    }
}

/// Coordinates session issuance/retirement/rotation over one provider.
pub struct ProxyManager {
    provider: Arc<dyn ProxyProvider>,
    rotation: ProxyRotation,
    cooldown: Duration,
    sessions: RwLock<HashMap<String, ProxySession>>,
    cooldowns: RwLock<HashMap<String, Instant>>,
}

impl ProxyManager {
    #[must_use]
    pub fn new(provider: Arc<dyn ProxyProvider>, rotation: ProxyRotation, cooldown: Duration) -> Self {
        Self {
            provider,
            rotation,
            cooldown,
            sessions: RwLock::new(HashMap::new()),
            cooldowns: RwLock::new(HashMap::new()),
        }
    }

    pub async fn initialize(&self) -> StealthResult<()> {
        self.provider
            .initialize()
            .await?
            .then_some(())
            .ok_or_else(|| StealthError::ProxyInit(format!("{} failed to initialize", self.provider.name())))
    }

    /// Creates a new `Active` session for `match_id`, excluding any proxy
    /// URL still in cooldown. `cookies` (opaque, caller-owned) is accepted
    /// for parity with the original sticky-session API but not interpreted
    /// here; callers thread it through their own cookie jar.
    pub async fn get_next_session(&self, match_id: &str, _cookies: Option<&str>) -> StealthResult<ProxySession> {
        let mut proxy_url = self.provider.get_proxy_url().await?;
        if let Some(url) = &proxy_url {
            let endpoint = Self::endpoint_key(url)
                .ok_or_else(|| StealthError::ProxyInit(format!("malformed proxy url from {}", self.provider.name())))?;
            if self.in_cooldown(&endpoint) {
                proxy_url = None;
            }
        }

        let session = ProxySession {
            id: Uuid::new_v4().to_string(),
            proxy_url,
            username: None,
            password: None,
            status: ProxySessionStatus::Active,
            match_id: Some(match_id.to_string()),
            created_at: chrono::Utc::now(),
        };
        self.sessions.write().insert(session.id.clone(), session.clone());
        Ok(session)
    }

    /// `host:port`, not the full URL: providers like `BrightDataProvider`
    /// bake a fresh session id into the username on every call, so keying
    /// cooldown on the raw string would never collide with itself.
    fn endpoint_key(raw: &str) -> Option<String> {
        let parsed = Url::parse(raw).ok()?;
        let host = parsed.host_str()?;
        Some(match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }

    fn in_cooldown(&self, endpoint: &str) -> bool {
        self.cooldowns
            .read()
            .get(endpoint)
            .is_some_and(|until| Instant::now() < *until)
    }

    /// Retires a session: Active -> Expired, records a cooldown on its
    /// proxy URL so it isn't handed out again until `cooldown` elapses.
    pub fn retire_session(&self, session_id: &str) -> StealthResult<()> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| StealthError::ProxyExhausted(format!("unknown session {session_id}")))?;

        if !session.can_transition_to(ProxySessionStatus::Expired) {
            return Err(StealthError::ProxyExhausted(format!(
                "session {session_id} cannot transition from {:?} to Expired",
                session.status
            )));
        }
        session.status = ProxySessionStatus::Expired;

        if let Some(url) = session.proxy_url.as_deref().and_then(Self::endpoint_key) {
            self.cooldowns.write().insert(url, Instant::now() + self.cooldown);
        }
        Ok(())
    }

    pub fn mark_failed(&self, session_id: &str) -> StealthResult<()> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| StealthError::ProxyExhausted(format!("unknown session {session_id}")))?;
        if !session.can_transition_to(ProxySessionStatus::Failed) {
            return Err(StealthError::ProxyExhausted(format!(
                "session {session_id} cannot transition from {:?} to Failed",
                session.status
            )));
        }
        session.status = ProxySessionStatus::Failed;
        Ok(())
    }

    #[must_use]
    pub fn rotation(&self) -> ProxyRotation {
        self.rotation
    }

    pub async fn health_check(&self) -> ProviderHealth {
        self.provider.health_check().await
    }

    /// Serializes live sessions to JSON for recovery across process
    /// restarts, mirroring the original's per-run session file.
    pub fn save_sessions(&self) -> StealthResult<String> {
        let sessions: Vec<ProxySession> = self.sessions.read().values().cloned().collect();
        serde_json::to_string(&sessions).map_err(|e| StealthError::Other(e.into()))
    }

    pub fn load_sessions(&self, json: &str) -> StealthResult<()> {
        let sessions: Vec<ProxySession> = serde_json::from_str(json).map_err(|e| StealthError::Other(e.into()))?;
        let mut guard = self.sessions.write();
        for session in sessions {
            guard.insert(session.id.clone(), session);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn session_status_is_monotone() {
        let manager = ProxyManager::new(Arc::new(MockProxyProvider::new()), ProxyRotation::PerMatch, Duration::from_secs(600));
        let session = manager.get_next_session("match-1", None).await.unwrap();
        manager.retire_session(&session.id).unwrap();
        assert!(manager.retire_session(&session.id).is_err(), "cannot expire twice");
    }

    #[tokio::test]
    async fn retired_proxy_url_is_excluded_during_cooldown() {
        let provider = Arc::new(BrightDataProvider::new("user", "pass"));
        let manager = ProxyManager::new(provider, ProxyRotation::PerMatch, Duration::from_secs(600));
        let session = manager.get_next_session("match-1", None).await.unwrap();
        let endpoint = ProxyManager::endpoint_key(&session.proxy_url.clone().unwrap()).unwrap();
        manager.retire_session(&session.id).unwrap();
        assert!(manager.in_cooldown(&endpoint));
    }

    #[tokio::test]
    async fn cooldown_excludes_same_endpoint_despite_fresh_session_id() {
        let provider = Arc::new(BrightDataProvider::new("user", "pass"));
        let manager = ProxyManager::new(provider, ProxyRotation::PerMatch, Duration::from_secs(600));
        let first = manager.get_next_session("match-1", None).await.unwrap();
        manager.retire_session(&first.id).unwrap();

        // BrightDataProvider bakes a new uuid into the username every call,
        // so the raw url differs, but it's still the same zproxy endpoint.
        let second = manager.get_next_session("match-2", None).await.unwrap();
        assert!(second.proxy_url.is_none(), "endpoint should still be in cooldown");
    }

    #[tokio::test]
    async fn mock_provider_issues_no_proxy_url() {
        let manager = ProxyManager::new(Arc::new(MockProxyProvider::new()), ProxyRotation::PerSession, Duration::from_secs(1));
        let session = manager.get_next_session("match-1", None).await.unwrap();
        assert!(session.proxy_url.is_none());
    }
}
