//! Basic-Auth gate for the dashboard API
//!
//! Credentials are read from `auth.json` next to the database (written by
//! the change-password endpoint), falling back to the configured user and
//! password. Failed logins are rate limited per client IP and the number of
//! concurrently active client IPs can be capped.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

/// Failed attempts allowed per IP within [`RATE_WINDOW`]
pub const RATE_MAX_FAILS: usize = 5;
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// A client counts as active for this long after its last request
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(60);

/// Contents of `auth.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub user: String,
    /// SHA-256 of the password, lowercase hex
    pub hash: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: &str) -> Self {
        Self {
            user: user.into(),
            hash: hash_password(password),
        }
    }

    /// Compare user and password hash in constant time
    pub fn matches(&self, user: &str, password: &str) -> bool {
        let user_ok = constant_time_eq(user.as_bytes(), self.user.as_bytes());
        let hash_ok = self.password_matches(password);
        user_ok & hash_ok
    }

    pub fn password_matches(&self, password: &str) -> bool {
        constant_time_eq(hash_password(password).as_bytes(), self.hash.as_bytes())
    }
}

pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Byte comparison whose duration depends only on the lengths
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Decode an `Authorization: Basic ...` header into user and password
pub fn parse_basic(header: &str) -> Option<(String, String)> {
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

/// Why a request was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Too Many Requests. Try again later.")]
    RateLimited,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Max connections reached. Try again later.")]
    TooManySessions,
}

/// Credential source plus failure and session bookkeeping
pub struct AuthGate {
    auth_file: PathBuf,
    fallback: Option<Credentials>,
    failures: DashMap<String, Vec<Instant>>,
    sessions: DashMap<String, Instant>,
}

impl AuthGate {
    /// Gate reading `auth_file`, falling back to `user`/`password` when both are set
    pub fn new(auth_file: impl Into<PathBuf>, user: &str, password: &str) -> Self {
        let fallback =
            (!user.is_empty() && !password.is_empty()).then(|| Credentials::new(user, password));

        Self {
            auth_file: auth_file.into(),
            fallback,
            failures: DashMap::new(),
            sessions: DashMap::new(),
        }
    }

    /// Current credentials, `None` when authentication is disabled
    pub fn credentials(&self) -> Option<Credentials> {
        match std::fs::read_to_string(&self.auth_file) {
            Ok(content) => match serde_json::from_str::<Credentials>(&content) {
                Ok(creds) if !creds.user.is_empty() && !creds.hash.is_empty() => {
                    return Some(creds)
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %self.auth_file.display(), error = %e, "Ignoring unreadable auth file");
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.auth_file.display(), error = %e, "Failed to read auth file");
            }
        }
        self.fallback.clone()
    }

    /// Persist new credentials to the auth file
    pub fn save(&self, credentials: &Credentials) -> Result<()> {
        let json = serde_json::to_string(credentials)?;
        std::fs::write(&self.auth_file, json)
            .with_context(|| format!("Failed to write {}", self.auth_file.display()))
    }

    /// Validate an `Authorization` header for a client.
    ///
    /// Returns the authenticated user, or `None` when authentication is
    /// disabled.
    pub fn authenticate(&self, ip: &str, header: Option<&str>) -> Result<Option<String>, AuthError> {
        let Some(creds) = self.credentials() else {
            return Ok(None);
        };

        if self.is_rate_limited(ip) {
            warn!(ip = %ip, "Rate limited");
            return Err(AuthError::RateLimited);
        }

        if let Some((user, password)) = header.and_then(parse_basic) {
            if creds.matches(&user, &password) {
                return Ok(Some(user));
            }
        }

        let remaining = RATE_MAX_FAILS.saturating_sub(self.record_failure(ip));
        warn!(ip = %ip, remaining = remaining, "Authentication failed");
        Err(AuthError::Unauthorized)
    }

    fn is_rate_limited(&self, ip: &str) -> bool {
        let recent = match self.failures.get_mut(ip) {
            Some(mut attempts) => {
                attempts.retain(|t| t.elapsed() < RATE_WINDOW);
                attempts.len()
            }
            None => return false,
        };
        if recent == 0 {
            self.failures.remove_if(ip, |_, attempts| attempts.is_empty());
        }
        recent >= RATE_MAX_FAILS
    }

    /// Drop failure records that have aged out of the window for every IP
    fn prune_failures(&self) {
        self.failures.retain(|_, attempts| {
            attempts.retain(|t| t.elapsed() < RATE_WINDOW);
            !attempts.is_empty()
        });
    }

    /// Returns the number of failures inside the window
    fn record_failure(&self, ip: &str) -> usize {
        self.prune_failures();
        let mut attempts = self.failures.entry(ip.to_string()).or_default();
        attempts.retain(|t| t.elapsed() < RATE_WINDOW);
        attempts.push(Instant::now());
        attempts.len()
    }

    /// Admit a client under the session cap and mark it active.
    ///
    /// A client that is already active is always admitted.
    pub fn admit(&self, ip: &str, max_connections: u32) -> Result<(), AuthError> {
        if max_connections > 0 && !self.is_active(ip) {
            let active = self.active_ips().len();
            if active >= max_connections as usize {
                warn!(ip = %ip, active = active, "Max connections reached");
                return Err(AuthError::TooManySessions);
            }
        }

        self.sessions.insert(ip.to_string(), Instant::now());
        Ok(())
    }

    fn is_active(&self, ip: &str) -> bool {
        self.sessions
            .get(ip)
            .map(|seen| seen.elapsed() < SESSION_TIMEOUT)
            .unwrap_or(false)
    }

    /// Client IPs seen within the session timeout
    pub fn active_ips(&self) -> Vec<String> {
        self.prune_failures();
        self.sessions.retain(|_, seen| seen.elapsed() < SESSION_TIMEOUT);
        let mut ips: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ips.sort();
        ips
    }
}
