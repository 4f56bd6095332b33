//! Token freshness state machine
//!
//! Decides, for a credential record, whether its token can be reused, must
//! be refreshed, or must be issued again:
//!
//! - Absent/Expired → issue with the `client_credentials` grant
//! - ExpiringSoon (inside the renew-before window) → `refresh_token` grant
//! - Fresh → no network call
//!
//! The engine never writes: it returns the token to use, and the caller
//! substitutes it into the record and persists it.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};

use crate::credentials::CredentialRecord;
use crate::error::Result;
use crate::token::{Token, TokenExchange};

/// Where a token stands relative to `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// No token was ever obtained.
    Absent,
    /// `now` is past the token's expiry.
    Expired,
    /// Still valid, but within `renew_before` of its expiry.
    ExpiringSoon,
    /// Valid beyond the renew-before window.
    Fresh,
}

impl Freshness {
    /// Classify `token` at `now`. The checks are ordered: expiry first,
    /// then the renew-before window.
    pub fn assess(token: Option<&Token>, now: DateTime<Utc>, renew_before: Duration) -> Self {
        let Some(token) = token else {
            return Freshness::Absent;
        };
        if now > token.expires_at {
            return Freshness::Expired;
        }
        let window = TimeDelta::from_std(renew_before).unwrap_or(TimeDelta::MAX);
        let renew_on = token
            .expires_at
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        if now > renew_on {
            Freshness::ExpiringSoon
        } else {
            Freshness::Fresh
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Freshness::Absent => "absent",
            Freshness::Expired => "expired",
            Freshness::ExpiringSoon => "expiring_soon",
            Freshness::Fresh => "fresh",
        }
    }
}

/// The outcome of [`ensure_fresh_token`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renewal {
    /// The state the previous token was found in.
    pub previous: Freshness,
    /// The token to hand out: new unless `previous` is `Fresh`.
    pub token: Token,
}

impl Renewal {
    /// Whether an exchange produced a new token that needs persisting.
    pub fn is_new(&self) -> bool {
        self.previous != Freshness::Fresh
    }
}

/// Make sure `record` has a usable token, exchanging with the token
/// endpoint when needed.
pub async fn ensure_fresh_token<E: TokenExchange>(
    exchange: &E,
    record: &CredentialRecord,
    renew_before: Duration,
) -> Result<Renewal> {
    ensure_fresh_token_at(exchange, record, renew_before, Utc::now()).await
}

/// [`ensure_fresh_token`] evaluated at an explicit `now`.
///
/// A failed exchange is returned as-is; `record` is untouched and nothing
/// is retried.
pub async fn ensure_fresh_token_at<E: TokenExchange>(
    exchange: &E,
    record: &CredentialRecord,
    renew_before: Duration,
    now: DateTime<Utc>,
) -> Result<Renewal> {
    let identity = &record.identity;
    let current = record.token.as_ref();
    let previous = Freshness::assess(current, now, renew_before);

    let token = match (previous, current) {
        (Freshness::Fresh, Some(token)) => {
            debug!(
                credential = %identity,
                expires_at = %token.expires_at,
                remaining_secs = (token.expires_at - now).num_seconds(),
                "token still valid"
            );
            token.clone()
        }
        (Freshness::ExpiringSoon, Some(token)) => {
            info!(
                credential = %identity,
                expires_at = %token.expires_at,
                renew_before_secs = renew_before.as_secs(),
                "token expires soon, refreshing"
            );
            exchange.refresh(identity, token).await?
        }
        (state, token) => {
            if let Some(token) = token {
                info!(
                    credential = %identity,
                    expires_at = %token.expires_at,
                    expired_secs = (now - token.expires_at).num_seconds(),
                    "token expired, issuing a new one"
                );
            } else {
                info!(credential = %identity, state = state.label(), "no token yet, issuing one");
            }
            exchange.issue(identity).await?
        }
    };

    Ok(Renewal { previous, token })
}
