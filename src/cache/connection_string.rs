use mongodb::options::ConnectionString;

use crate::{Result, SyncLensError};

/// Check the syntax of a document-database connection string without any network I/O.
///
/// Parsing is delegated to the driver's own URI parser, so anything accepted here is
/// also accepted by [`crate::cache::MongoConnector`]. SRV records are not resolved.
pub fn validate(connection_string: &str) -> Result<()> {
    if connection_string.trim().is_empty() {
        return Err(SyncLensError::InvalidConnectionString(
            "connection string is empty".to_string(),
        ));
    }
    ConnectionString::parse(connection_string)
        .map(|_| ())
        .map_err(|e| SyncLensError::InvalidConnectionString(e.to_string()))
}

/// Connection string with the password replaced, safe for logs
pub fn redact(connection_string: &str) -> String {
    let Some(scheme_end) = connection_string.find("://") else {
        return connection_string.to_string();
    };
    let body_start = scheme_end + 3;
    let body = &connection_string[body_start..];
    let Some(at) = body.rfind('@') else {
        return connection_string.to_string();
    };
    let userinfo = &body[..at];
    match userinfo.split_once(':') {
        Some((user, _)) => format!(
            "{}{}:****{}",
            &connection_string[..body_start],
            user,
            &body[at..]
        ),
        None => connection_string.to_string(),
    }
}
