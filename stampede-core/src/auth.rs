//! Token acquisition for the credential set of a run.
//!
//! Every credential is exchanged exactly once, before any VU starts. The resulting
//! [`TokenPool`] is immutable for the rest of the run; VUs pick their token by index.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use stampede_http::{HttpClient, HttpRequest};
use tokio::time::Instant;

pub const TOKEN_PATH: &str = "/authorizationprovider/connect/token";

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub id: String,
    secret: String,
}

impl Credential {
    pub fn new(id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Clone)]
pub struct Token {
    value: Arc<str>,
    owner: usize,
    acquired_at: Instant,
    expires_in: Option<Duration>,
}

impl Token {
    pub fn new(value: impl Into<Arc<str>>, owner: usize) -> Self {
        Self {
            value: value.into(),
            owner,
            acquired_at: Instant::now(),
            expires_in: None,
        }
    }

    #[must_use]
    pub fn with_expires_in(mut self, expires_in: Option<Duration>) -> Self {
        self.expires_in = expires_in;
        self
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Index of the credential this token was issued for.
    pub fn owner(&self) -> usize {
        self.owner
    }

    pub fn expires_in(&self) -> Option<Duration> {
        self.expires_in
    }

    /// Whether the advertised lifetime has elapsed at `now`. Tokens without a
    /// lifetime never go stale.
    pub fn is_stale_at(&self, now: Instant) -> bool {
        self.expires_in
            .is_some_and(|ttl| now.saturating_duration_since(self.acquired_at) >= ttl)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("owner", &self.owner)
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

/// Token used by the VU with 1-based index `vu_id` out of `token_count` tokens.
#[must_use]
pub fn token_index(vu_id: u64, token_count: usize) -> Option<usize> {
    if vu_id == 0 || token_count == 0 {
        return None;
    }
    Some(((vu_id - 1) % token_count as u64) as usize)
}

/// Read-only set of tokens shared by all VUs, in credential order.
#[derive(Debug, Clone, Default)]
pub struct TokenPool {
    tokens: Arc<[Token]>,
}

impl TokenPool {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens: tokens.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index)
    }

    pub fn token_for_vu(&self, vu_id: u64) -> Option<&Token> {
        token_index(vu_id, self.tokens.len()).and_then(|i| self.tokens.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Token> {
        self.tokens.iter()
    }

    pub fn stale_count(&self, now: Instant) -> usize {
        self.tokens.iter().filter(|t| t.is_stale_at(now)).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("authentication failed for credential #{index} (`{credential_id}`){}: {reason}", status_suffix(.status))]
pub struct AuthSetupError {
    pub index: usize,
    pub credential_id: String,
    /// `None` when no HTTP status was received.
    pub status: Option<u16>,
    pub reason: String,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" with status {s}")).unwrap_or_default()
}

/// Result of one successful exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthGrant {
    pub access_token: String,
    pub expires_in: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    #[error("unexpected status")]
    Status(u16),

    #[error("{0}")]
    Transport(String),

    #[error("invalid token response: {0}")]
    InvalidResponse(String),
}

/// Turns one credential into a token.
pub trait AuthExchange: Send + Sync {
    fn exchange(
        &self,
        credential: &Credential,
    ) -> impl Future<Output = Result<AuthGrant, ExchangeError>> + Send;
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// OAuth2 client-credentials exchange against `<base>/authorizationprovider/connect/token`.
#[derive(Debug, Clone)]
pub struct ClientCredentialsExchange {
    client: HttpClient,
    url: String,
    timeout: Duration,
}

impl ClientCredentialsExchange {
    pub fn new(client: HttpClient, base_url: &str) -> Self {
        Self {
            client,
            url: format!("{}{TOKEN_PATH}", base_url.trim_end_matches('/')),
            timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl AuthExchange for ClientCredentialsExchange {
    async fn exchange(&self, credential: &Credential) -> Result<AuthGrant, ExchangeError> {
        let req = HttpRequest::post_form(
            self.url.clone(),
            [
                ("grant_type", "client_credentials"),
                ("client_id", credential.id.as_str()),
                ("client_secret", credential.secret()),
                ("response_type", "token"),
            ],
        )
        .with_timeout(self.timeout);

        let res = self
            .client
            .request(req)
            .await
            .map_err(|err| ExchangeError::Transport(err.to_string()))?;

        if res.status != 200 {
            return Err(ExchangeError::Status(res.status));
        }

        let body: TokenBody = serde_json::from_slice(&res.body)
            .map_err(|err| ExchangeError::InvalidResponse(err.to_string()))?;

        let access_token = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ExchangeError::InvalidResponse("missing `access_token`".to_string()))?;

        Ok(AuthGrant {
            access_token,
            expires_in: body.expires_in.map(Duration::from_secs),
        })
    }
}

#[derive(Debug, Clone)]
pub struct TokenManager<E> {
    exchange: E,
}

impl<E: AuthExchange> TokenManager<E> {
    pub fn new(exchange: E) -> Self {
        Self { exchange }
    }

    /// Exchanges every credential in order. The first failure aborts the whole
    /// acquisition; no partial pool is returned.
    pub async fn acquire_all(&self, credentials: &[Credential]) -> Result<TokenPool, AuthSetupError> {
        let mut tokens = Vec::with_capacity(credentials.len());

        for (index, credential) in credentials.iter().enumerate() {
            match self.exchange.exchange(credential).await {
                Ok(grant) => {
                    tracing::info!(
                        credential = index,
                        client_id = %credential.id,
                        expires_in = ?grant.expires_in,
                        "token acquired"
                    );
                    tokens.push(
                        Token::new(grant.access_token, index).with_expires_in(grant.expires_in),
                    );
                }
                Err(err) => {
                    let status = match &err {
                        ExchangeError::Status(s) => Some(*s),
                        ExchangeError::Transport(_) | ExchangeError::InvalidResponse(_) => None,
                    };
                    tracing::error!(
                        credential = index,
                        client_id = %credential.id,
                        status,
                        error = %err,
                        "token acquisition failed"
                    );
                    return Err(AuthSetupError {
                        index,
                        credential_id: credential.id.clone(),
                        status,
                        reason: err.to_string(),
                    });
                }
            }
        }

        Ok(TokenPool::new(tokens))
    }
}
