//! OAuth tokens and the Bitbucket token endpoint
//!
//! Two grants hit the same endpoint:
//! 1. `client_credentials` issues a brand-new token for the OAuth consumer
//! 2. `refresh_token` extends an existing token
//!
//! Both authenticate with HTTP Basic `(client_id, secret)`.
//!
//! A token's expiry is always held as an absolute instant. The endpoint
//! answers with a relative `expires_in`; credential files carry an absolute
//! `expires_on`. [`Token::decode`] accepts either and converts once.

use chrono::{DateTime, TimeDelta, Utc};
use common::Secret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::TOKEN_ENDPOINT;
use crate::error::{Error, Result};
use crate::identity::Identity;

/// An OAuth bearer token pair.
///
/// Never patched in place: every exchange yields a new `Token` that
/// replaces the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TokenRepr", into = "TokenRepr")]
pub struct Token {
    pub token_type: String,
    pub access_token: Secret<String>,
    pub refresh_token: Secret<String>,
    pub expires_at: DateTime<Utc>,
    pub scopes: String,
}

/// Wire shape of a token, shared by the endpoint response and the
/// credential file.
///
/// Serialization always writes `expires_on`. Deserialization accepts
/// `expires_on` (absolute) or `expires_in` (seconds from now).
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TokenRepr {
    #[serde(default)]
    pub token_type: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub scopes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
}

impl Token {
    /// Build a token from its wire shape, resolving the expiry against `now`.
    ///
    /// `expires_on` wins when present. Otherwise the expiry is
    /// `now + expires_in`; with neither field the token is already due.
    pub fn decode(repr: TokenRepr, now: DateTime<Utc>) -> Self {
        let expires_at = match (repr.expires_on, repr.expires_in) {
            (Some(expires_on), _) => expires_on,
            (None, seconds) => {
                let seconds = seconds.unwrap_or(0);
                // Out-of-range offsets saturate toward their own sign
                let bound = if seconds < 0 {
                    DateTime::<Utc>::MIN_UTC
                } else {
                    DateTime::<Utc>::MAX_UTC
                };
                TimeDelta::try_seconds(seconds)
                    .and_then(|delta| now.checked_add_signed(delta))
                    .unwrap_or(bound)
            }
        };
        Self {
            token_type: repr.token_type,
            access_token: Secret::new(repr.access_token),
            refresh_token: Secret::new(repr.refresh_token),
            expires_at,
            scopes: repr.scopes,
        }
    }
}

impl From<TokenRepr> for Token {
    fn from(repr: TokenRepr) -> Self {
        Token::decode(repr, Utc::now())
    }
}

impl From<Token> for TokenRepr {
    fn from(token: Token) -> Self {
        TokenRepr {
            token_type: token.token_type,
            access_token: token.access_token.expose().clone(),
            refresh_token: token.refresh_token.expose().clone(),
            scopes: token.scopes,
            expires_on: Some(token.expires_at),
            expires_in: None,
        }
    }
}

/// Client for the OAuth token endpoint.
#[derive(Debug, Clone)]
pub struct TokenClient {
    http: reqwest::Client,
    endpoint: String,
}

impl TokenClient {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    /// Client for `https://bitbucket.org/site/oauth2/access_token`.
    pub fn bitbucket(http: reqwest::Client) -> Self {
        Self::new(http, TOKEN_ENDPOINT)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Issue a new token with the `client_credentials` grant.
    pub async fn issue_token(&self, client_id: &str, secret: &str) -> Result<Token> {
        self.request(
            client_id,
            secret,
            &[("grant_type", "client_credentials")],
            "token issue",
        )
        .await
    }

    /// Renew a token with the `refresh_token` grant.
    pub async fn refresh_token(
        &self,
        client_id: &str,
        secret: &str,
        refresh: &str,
    ) -> Result<Token> {
        self.request(
            client_id,
            secret,
            &[("grant_type", "refresh_token"), ("refresh_token", refresh)],
            "token refresh",
        )
        .await
    }

    async fn request(
        &self,
        client_id: &str,
        secret: &str,
        form: &[(&str, &str)],
        operation: &str,
    ) -> Result<Token> {
        debug!(endpoint = %self.endpoint, grant_type = form[0].1, "requesting token");

        let response = self
            .http
            .post(&self.endpoint)
            .basic_auth(client_id, Some(secret))
            .form(form)
            .send()
            .await
            .map_err(|e| Error::Http(format!("{operation} request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));

            // 401/403 means the consumer or the refresh token was rejected
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(Error::InvalidCredentials(format!(
                    "{operation} rejected ({status}): {body}"
                )));
            }

            return Err(Error::TokenExchange(format!(
                "{operation} returned {status}: {body}"
            )));
        }

        response
            .json::<Token>()
            .await
            .map_err(|e| Error::TokenExchange(format!("invalid {operation} response: {e}")))
    }
}

/// The network side of the token lifecycle.
///
/// [`TokenClient`] is the real implementation; the lifecycle engine only
/// sees this trait.
pub trait TokenExchange {
    /// Issue a brand-new token for the identity's OAuth consumer.
    fn issue(&self, identity: &Identity) -> impl Future<Output = Result<Token>>;

    /// Renew `current` using its refresh token.
    fn refresh(&self, identity: &Identity, current: &Token) -> impl Future<Output = Result<Token>>;
}

impl TokenExchange for TokenClient {
    async fn issue(&self, identity: &Identity) -> Result<Token> {
        let (client_id, secret) = identity.client_credentials()?;
        self.issue_token(client_id, secret).await
    }

    async fn refresh(&self, identity: &Identity, current: &Token) -> Result<Token> {
        let (client_id, secret) = identity.client_credentials()?;
        self.refresh_token(client_id, secret, current.refresh_token.expose())
            .await
    }
}
