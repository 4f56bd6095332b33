//! Bitbucket OAuth constants
//!
//! Client id and secret are not constants here: every credential record
//! carries its own OAuth consumer, registered per Bitbucket workspace.

use std::time::Duration;

/// Application name, used for the store directory and the User-Agent
pub const APP_NAME: &str = "git-credential-bitbucket";

/// User-Agent sent to the token endpoint
pub const USER_AGENT: &str = concat!("git-credential-bitbucket/", env!("CARGO_PKG_VERSION"));

/// Token endpoint for both the client-credentials and refresh-token grants
pub const TOKEN_ENDPOINT: &str = "https://bitbucket.org/site/oauth2/access_token";

/// Protocol assumed when git does not send one
pub const DEFAULT_PROTOCOL: &str = "https";

/// Username handed back to git. Bitbucket accepts any OAuth access token
/// as the password for this fixed user.
pub const TOKEN_USERNAME: &str = "x-token-auth";

/// How long before expiry a token gets refreshed by default
pub const DEFAULT_RENEW_BEFORE: Duration = Duration::from_secs(10 * 60);
