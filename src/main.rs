use anyhow::Result;
use std::fs::File;
use std::path::Path;
use tracing::{error, info, warn};

use synclens::cache::connection_string::redact;
use synclens::cache::{ConnectionCache, MongoConnector};
use synclens::config::Config;
use synclens::ingest::{UploadPolicy, decode};
use synclens::session::{CredentialResolver, SessionStore};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(config.log_level.clone())
        .init();

    info!("synclens v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.validate() {
        error!("{}", e);
        return Err(e.into());
    }

    let sessions = SessionStore::new(config.session_timeout_duration());
    let pool_options = config.pool_options();
    let connections = ConnectionCache::new(
        MongoConnector::new(pool_options.socket_timeout),
        pool_options,
    );
    info!(
        "Session timeout {:?}, pool size {}, timeout {:?}, refresh every {:?}",
        sessions.timeout(),
        config.pool_size,
        config.connect_timeout_duration(),
        config.refresh_interval_duration()
    );
    if !config.secure_cookies {
        warn!("Secure cookies are disabled; session ids may travel over plain HTTP");
    }

    if let Some(input) = &config.input {
        inspect_archive(input, &config)?;
    }

    let resolver = CredentialResolver::new(
        &sessions,
        config.connection_string.as_deref(),
        config.progress_endpoint_url.as_deref(),
    );
    if let Some(connection_string) = resolver.connection_string(None) {
        match connections.validate_connection(&connection_string).await {
            Ok(_) => info!("Destination cluster {} is reachable", redact(&connection_string)),
            Err(e) => {
                error!("{}", e.user_message());
                return Err(e.into());
            }
        }
    }
    if let Some(endpoint) = resolver.endpoint_url(None) {
        info!("Progress endpoint configured: {}", endpoint);
    }

    info!("Active sessions: {}", sessions.active_count());
    Ok(())
}

/// Run an archive through the upload checks and the decoder, reporting what it holds
fn inspect_archive(path: &Path, config: &Config) -> Result<()> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    let filename = path.file_name().map(|name| name.to_string_lossy().into_owned());

    let policy = UploadPolicy::new(config.max_file_size);
    let kind = match policy.check(filename.as_deref(), &config.content_type, size) {
        Ok(kind) => kind,
        Err(e) => {
            error!("[{}] {}", e.code(), e.user_message());
            return Err(e.into());
        }
    };
    info!("Inspecting {} ({} bytes) as {}", path.display(), size, kind);

    let mut lines = decode(&mut file, kind)?;
    for line in lines.by_ref() {
        if let Err(e) = line {
            error!("[{}] {}", e.code(), e.user_message());
            return Err(e.into());
        }
    }
    info!(
        "Decoded {} lines ({} bytes) from {}",
        lines.lines_yielded(),
        lines.bytes_yielded(),
        path.display()
    );
    Ok(())
}
