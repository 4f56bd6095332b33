//! The `get`, `store` and `erase` operations
//!
//! Each invocation handles one identity: resolve it from the parameters,
//! touch its record in the store, and for `get` keep the token fresh.

use std::borrow::Cow;
use std::io::Write;
use std::time::Duration;

use bitbucket_auth::identity::{PARAM_PASSWORD, PARAM_WORKSPACE};
use bitbucket_auth::{
    CredentialRecord, CredentialStore, Error, Identity, Parameters, Result, TokenExchange,
    ensure_fresh_token,
};
use tracing::{debug, error, info};

use crate::protocol;

/// Credential helper operation selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Get,
    Store,
    Erase,
}

impl Operation {
    /// Case-insensitive; `None` for operations this helper does not support.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "get" => Some(Operation::Get),
            "store" => Some(Operation::Store),
            "erase" => Some(Operation::Erase),
            _ => None,
        }
    }
}

/// Runs helper operations against one store and token endpoint.
pub struct Helper<E> {
    store: CredentialStore,
    exchange: E,
    renew_before: Duration,
    workspace: Option<String>,
}

impl<E: TokenExchange> Helper<E> {
    pub fn new(store: CredentialStore, exchange: E, renew_before: Duration) -> Self {
        Self {
            store,
            exchange,
            renew_before,
            workspace: None,
        }
    }

    /// Force `workspace` onto every operation, whatever git passed in.
    pub fn with_workspace(mut self, workspace: Option<String>) -> Self {
        self.workspace = workspace;
        self
    }

    pub async fn run<W: Write>(
        &self,
        operation: Operation,
        parameters: &Parameters,
        out: W,
    ) -> Result<()> {
        let parameters = self.effective_parameters(parameters);
        match operation {
            Operation::Get => self.get(&parameters, out).await,
            Operation::Store => self.store(&parameters).await.map(|_| ()),
            Operation::Erase => self.erase(&parameters).await.map(|_| ()),
        }
    }

    fn effective_parameters<'a>(&self, parameters: &'a Parameters) -> Cow<'a, Parameters> {
        match &self.workspace {
            Some(workspace) => {
                debug!(workspace = %workspace, "forcing workspace parameter");
                let mut parameters = parameters.clone();
                parameters.insert(PARAM_WORKSPACE.to_owned(), workspace.clone());
                Cow::Owned(parameters)
            }
            None => Cow::Borrowed(parameters),
        }
    }

    /// Load the credential, make sure its token is fresh and write it to `out`.
    ///
    /// A new token is persisted before it is written out. If persisting
    /// fails the token is still handed to git; the next `get` will simply
    /// exchange again.
    pub async fn get<W: Write>(&self, parameters: &Parameters, out: W) -> Result<()> {
        let identity = Identity::resolve(parameters)?;
        let record = self.store.load(&identity).await?;
        let renewal = ensure_fresh_token(&self.exchange, &record, self.renew_before).await?;

        let record = if renewal.is_new() {
            let record = record.with_token(renewal.token);
            if let Err(e) = self.store.save(&record).await {
                error!(credential = %record.identity, error = %e, "failed to save credential");
            }
            record
        } else {
            record
        };

        protocol::write_credential(out, &record)
            .map_err(|e| Error::Io(format!("writing credential: {e}")))
    }

    /// Create a record from `clientid`/`secret`.
    ///
    /// git calls `store` with the password it just used after a successful
    /// operation; that password is our own access token, so such calls are
    /// ignored and `None` is returned.
    pub async fn store(&self, parameters: &Parameters) -> Result<Option<CredentialRecord>> {
        if parameters.contains_key(PARAM_PASSWORD) {
            debug!("store called with a password, ignoring");
            return Ok(None);
        }
        let identity = Identity::resolve_with_secrets(parameters)?;
        self.store.create(identity).await.map(Some)
    }

    /// Delete the record. Missing or unresolvable credentials are not errors.
    pub async fn erase(&self, parameters: &Parameters) -> Result<bool> {
        let erased = self.store.erase(parameters).await?;
        info!(erased, "erase done");
        Ok(erased)
    }
}
