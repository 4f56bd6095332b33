//! git credential-helper line protocol
//!
//! Input is `key=value` lines terminated by a blank line or end of input.
//! Output is the credential git should use, in the same format.

use std::io::{self, BufRead, Write};

use bitbucket_auth::{CredentialRecord, Parameters, TOKEN_USERNAME};
use tracing::{debug, warn};

/// Read parameters until a blank line or end of input.
///
/// Keys and values are trimmed; the value is everything after the first
/// `=`. Lines without `=` are skipped with a warning. A repeated key keeps
/// its last value.
pub fn read_parameters<R: BufRead>(reader: R) -> io::Result<Parameters> {
    let mut parameters = Parameters::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            break;
        }
        match line.split_once('=') {
            Some((key, value)) => {
                let key = key.trim();
                debug!(key, "read parameter");
                parameters.insert(key.to_owned(), value.trim().to_owned());
            }
            None => warn!(line = %line, "ignoring malformed parameter line"),
        }
    }
    Ok(parameters)
}

/// Write the credential git should use for `record`.
///
/// The username is always `x-token-auth`: the access token is the real
/// credential. `password` is only written when a token exists.
pub fn write_credential<W: Write>(mut out: W, record: &CredentialRecord) -> io::Result<()> {
    writeln!(out, "protocol={}", record.identity.protocol)?;
    writeln!(out, "host={}", record.identity.host)?;
    writeln!(out, "username={TOKEN_USERNAME}")?;
    if let Some(token) = &record.token {
        writeln!(out, "password={}", token.access_token.expose())?;
    }
    out.flush()
}
