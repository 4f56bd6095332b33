//! Identity resolution from credential-helper parameters
//!
//! git hands the helper a loose set of `key=value` pairs. An [`Identity`]
//! is the validated view of them: which Bitbucket user (and optionally
//! which workspace) on which host the credential belongs to, plus the OAuth
//! consumer when one was supplied.

use std::collections::HashMap;
use std::fmt;

use common::Secret;
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_PROTOCOL;
use crate::error::{Error, Result};

/// Input parameters as read from the credential-helper protocol.
pub type Parameters = HashMap<String, String>;

pub const PARAM_PROTOCOL: &str = "protocol";
pub const PARAM_HOST: &str = "host";
pub const PARAM_USERNAME: &str = "username";
pub const PARAM_WORKSPACE: &str = "workspace";
pub const PARAM_CLIENT_ID: &str = "clientid";
pub const PARAM_SECRET: &str = "secret";
pub const PARAM_PASSWORD: &str = "password";

/// Required parameters were missing, or a storage-key parameter could not
/// be used as part of a file name.
///
/// Every problem is collected before failing, so a single report names all
/// of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    missing: Vec<&'static str>,
    invalid: Vec<&'static str>,
}

impl ValidationError {
    pub fn new(missing: Vec<&'static str>) -> Self {
        Self {
            missing,
            invalid: Vec::new(),
        }
    }

    /// Names of the missing parameters, in the order they were checked.
    pub fn missing(&self) -> &[&'static str] {
        &self.missing
    }

    /// Names of the parameters holding a path separator.
    pub fn invalid(&self) -> &[&'static str] {
        &self.invalid
    }

    fn check(
        missing: Vec<&'static str>,
        invalid: Vec<&'static str>,
    ) -> std::result::Result<(), Self> {
        if missing.is_empty() && invalid.is_empty() {
            Ok(())
        } else {
            Err(Self { missing, invalid })
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.missing.is_empty() {
            write!(f, "missing required parameters: {}", self.missing.join(", "))?;
            if !self.invalid.is_empty() {
                f.write_str("; ")?;
            }
        }
        if !self.invalid.is_empty() {
            write!(
                f,
                "parameters must not contain path separators: {}",
                self.invalid.join(", ")
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Who a credential belongs to.
///
/// `(username, workspace, host)` is the storage key; `protocol` and the
/// client credentials ride along.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub protocol: String,
    pub host: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(
        default,
        rename = "secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub client_secret: Option<Secret<String>>,
}

impl Identity {
    /// Build an identity from `protocol`, `host`, `username` and `workspace`.
    ///
    /// Only `host` and `username` are required. Client credentials in the
    /// parameters are ignored; lookups never need them.
    pub fn resolve(parameters: &Parameters) -> std::result::Result<Self, ValidationError> {
        let mut missing = Vec::new();
        let identity = Self::collect(parameters, &mut missing);
        ValidationError::check(missing, identity.unsafe_key_fields()).map(|()| identity)
    }

    /// Like [`Identity::resolve`], but `clientid` and `secret` are required too.
    pub fn resolve_with_secrets(
        parameters: &Parameters,
    ) -> std::result::Result<Self, ValidationError> {
        let mut missing = Vec::new();
        let mut identity = Self::collect(parameters, &mut missing);
        identity.client_id = required(parameters, PARAM_CLIENT_ID, &mut missing);
        identity.client_secret = required(parameters, PARAM_SECRET, &mut missing).map(Secret::new);
        ValidationError::check(missing, identity.unsafe_key_fields()).map(|()| identity)
    }

    fn collect(parameters: &Parameters, missing: &mut Vec<&'static str>) -> Self {
        let protocol = optional(parameters, PARAM_PROTOCOL)
            .unwrap_or_else(|| DEFAULT_PROTOCOL.to_owned());
        let host = required(parameters, PARAM_HOST, missing).unwrap_or_default();
        let username = required(parameters, PARAM_USERNAME, missing).unwrap_or_default();
        Self {
            protocol,
            host,
            username,
            workspace: optional(parameters, PARAM_WORKSPACE),
            client_id: None,
            client_secret: None,
        }
    }

    /// File name of this identity's record: `<username>[-<workspace>]@<host>.json`.
    pub fn filename(&self) -> String {
        format!("{self}.json")
    }

    /// Fail unless every storage-key field can be embedded in a file name.
    pub fn check_key(&self) -> std::result::Result<(), ValidationError> {
        ValidationError::check(Vec::new(), self.unsafe_key_fields())
    }

    fn unsafe_key_fields(&self) -> Vec<&'static str> {
        let fields = [
            (PARAM_HOST, Some(&self.host)),
            (PARAM_USERNAME, Some(&self.username)),
            (PARAM_WORKSPACE, self.workspace.as_ref()),
        ];
        fields
            .into_iter()
            .filter(|(_, value)| value.is_some_and(|v| v.contains(['/', '\\', '\0'])))
            .map(|(key, _)| key)
            .collect()
    }

    /// The OAuth consumer used for both grants.
    pub fn client_credentials(&self) -> Result<(&str, &str)> {
        match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) => Ok((id.as_str(), secret.expose().as_str())),
            _ => Err(Error::InvalidCredentials(format!(
                "no client id/secret stored for {self}"
            ))),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.workspace {
            Some(workspace) => write!(f, "{}-{}@{}", self.username, workspace, self.host),
            None => write!(f, "{}@{}", self.username, self.host),
        }
    }
}

/// Empty values count as absent.
fn optional(parameters: &Parameters, key: &str) -> Option<String> {
    parameters
        .get(key)
        .filter(|value| !value.is_empty())
        .cloned()
}

fn required(
    parameters: &Parameters,
    key: &'static str,
    missing: &mut Vec<&'static str>,
) -> Option<String> {
    let value = optional(parameters, key);
    if value.is_none() {
        missing.push(key);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Parameters {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn resolve_defaults_protocol_to_https() {
        let identity =
            Identity::resolve(&params(&[("host", "bitbucket.org"), ("username", "alice")]))
                .unwrap();
        assert_eq!(identity.protocol, "https");
        assert_eq!(identity.host, "bitbucket.org");
        assert_eq!(identity.username, "alice");
        assert_eq!(identity.workspace, None);
        assert_eq!(identity.client_id, None);
    }

    #[test]
    fn resolve_carries_protocol_and_workspace() {
        let identity = Identity::resolve(&params(&[
            ("protocol", "ssh"),
            ("host", "bitbucket.org"),
            ("username", "alice"),
            ("workspace", "team1"),
        ]))
        .unwrap();
        assert_eq!(identity.protocol, "ssh");
        assert_eq!(identity.workspace.as_deref(), Some("team1"));
    }

    #[test]
    fn resolve_ignores_client_credentials() {
        let identity = Identity::resolve(&params(&[
            ("host", "bitbucket.org"),
            ("username", "alice"),
            ("clientid", "X"),
            ("secret", "Y"),
        ]))
        .unwrap();
        assert!(identity.client_id.is_none());
        assert!(identity.client_secret.is_none());
    }

    #[test]
    fn resolve_reports_every_missing_field() {
        let err = Identity::resolve(&params(&[("protocol", "https")])).unwrap_err();
        assert_eq!(err.missing(), ["host", "username"]);
        assert_eq!(
            err.to_string(),
            "missing required parameters: host, username"
        );
    }

    #[test]
    fn resolve_treats_empty_values_as_missing() {
        let err = Identity::resolve(&params(&[("host", ""), ("username", "alice")])).unwrap_err();
        assert_eq!(err.missing(), ["host"]);
    }

    #[test]
    fn resolve_with_secrets_requires_client_credentials() {
        let err =
            Identity::resolve_with_secrets(&params(&[("host", "bitbucket.org"), ("username", "alice")]))
                .unwrap_err();
        assert_eq!(err.missing(), ["clientid", "secret"]);
    }

    #[test]
    fn resolve_with_secrets_aggregates_identity_and_secret_fields() {
        let err = Identity::resolve_with_secrets(&params(&[("clientid", "X")])).unwrap_err();
        assert_eq!(err.missing(), ["host", "username", "secret"]);
    }

    #[test]
    fn resolve_with_secrets_keeps_client_credentials() {
        let identity = Identity::resolve_with_secrets(&params(&[
            ("host", "bitbucket.org"),
            ("username", "alice"),
            ("clientid", "X"),
            ("secret", "Y"),
        ]))
        .unwrap();
        assert_eq!(identity.client_credentials().unwrap(), ("X", "Y"));
    }

    #[test]
    fn client_credentials_missing_is_invalid_credentials() {
        let identity =
            Identity::resolve(&params(&[("host", "bitbucket.org"), ("username", "alice")]))
                .unwrap();
        let err = identity.client_credentials().unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials(_)), "got: {err:?}");
        assert!(err.to_string().contains("alice@bitbucket.org"));
    }

    #[test]
    fn filename_without_workspace() {
        let identity =
            Identity::resolve(&params(&[("host", "bitbucket.org"), ("username", "alice")]))
                .unwrap();
        assert_eq!(identity.filename(), "alice@bitbucket.org.json");
    }

    #[test]
    fn filename_with_workspace() {
        let identity = Identity::resolve(&params(&[
            ("host", "bitbucket.org"),
            ("username", "alice"),
            ("workspace", "team1"),
        ]))
        .unwrap();
        assert_eq!(identity.filename(), "alice-team1@bitbucket.org.json");
    }

    #[test]
    fn resolve_rejects_path_separators_in_key_fields() {
        let err = Identity::resolve(&params(&[
            ("host", "bitbucket.org"),
            ("username", "../escape"),
            ("workspace", "team\\1"),
        ]))
        .unwrap_err();
        assert!(err.missing().is_empty());
        assert_eq!(err.invalid(), ["username", "workspace"]);
        assert_eq!(
            err.to_string(),
            "parameters must not contain path separators: username, workspace"
        );
    }

    #[test]
    fn resolve_with_secrets_reports_missing_and_invalid_together() {
        let err = Identity::resolve_with_secrets(&params(&[
            ("host", "evil.org/.."),
            ("username", "alice"),
        ]))
        .unwrap_err();
        assert_eq!(err.missing(), ["clientid", "secret"]);
        assert_eq!(err.invalid(), ["host"]);
        assert_eq!(
            err.to_string(),
            "missing required parameters: clientid, secret; \
             parameters must not contain path separators: host"
        );
    }

    #[test]
    fn dots_without_separators_are_plain_names() {
        let identity =
            Identity::resolve(&params(&[("host", "bitbucket.org"), ("username", "..")])).unwrap();
        assert_eq!(identity.filename(), "..@bitbucket.org.json");
        assert!(identity.check_key().is_ok());
    }

    #[test]
    fn check_key_catches_hand_built_identity() {
        let identity = Identity {
            protocol: "https".into(),
            host: "bitbucket.org".into(),
            username: "/etc/passwd".into(),
            workspace: None,
            client_id: None,
            client_secret: None,
        };
        assert_eq!(identity.check_key().unwrap_err().invalid(), ["username"]);
    }

    #[test]
    fn debug_output_redacts_secret() {
        let identity = Identity::resolve_with_secrets(&params(&[
            ("host", "bitbucket.org"),
            ("username", "alice"),
            ("clientid", "X"),
            ("secret", "super-secret-value"),
        ]))
        .unwrap();
        let debug = format!("{identity:?}");
        assert!(!debug.contains("super-secret-value"), "got: {debug}");
    }
}
