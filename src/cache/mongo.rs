use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::error::ErrorKind;
use mongodb::options::ClientOptions;
use mongodb::Client;
use std::time::Duration;
use tracing::debug;

use crate::cache::connection_cache::{Connector, PoolOptions};
use crate::{Result, SyncLensError};

const APP_NAME: &str = "synclens";

/// Connector for the destination cluster, backed by the official MongoDB driver
#[derive(Debug, Clone)]
pub struct MongoConnector {
    /// Upper bound on a single liveness round trip (the driver has no socket timeout of its own)
    probe_timeout: Duration,
}

impl MongoConnector {
    pub fn new(probe_timeout: Duration) -> Self {
        Self { probe_timeout }
    }
}

impl Default for MongoConnector {
    fn default() -> Self {
        Self::new(PoolOptions::default().socket_timeout)
    }
}

fn connect_error(err: mongodb::error::Error) -> SyncLensError {
    match *err.kind {
        ErrorKind::InvalidArgument { .. } => SyncLensError::InvalidConnectionString(err.to_string()),
        _ => SyncLensError::ConnectFailed(err.to_string()),
    }
}

#[async_trait]
impl Connector for MongoConnector {
    type Handle = Client;

    async fn connect(&self, connection_string: &str, options: &PoolOptions) -> Result<Client> {
        let mut client_options = ClientOptions::parse(connection_string)
            .await
            .map_err(connect_error)?;

        client_options.app_name = Some(APP_NAME.to_string());
        client_options.max_pool_size = Some(options.max_pool_size);
        client_options.min_pool_size = Some(options.min_pool_size);
        client_options.max_idle_time = Some(options.max_idle_time);
        client_options.server_selection_timeout = Some(options.server_selection_timeout);
        client_options.connect_timeout = Some(options.connect_timeout);
        client_options.retry_reads = Some(true);
        client_options.retry_writes = Some(true);

        debug!(
            "Creating client with pool size {}..{}, timeout {:?}",
            options.min_pool_size, options.max_pool_size, options.connect_timeout
        );
        Client::with_options(client_options).map_err(connect_error)
    }

    async fn ping(&self, client: &Client) -> Result<()> {
        let admin = client.database("admin");
        let probe = admin.run_command(doc! { "ping": 1 }, None);
        match tokio::time::timeout(self.probe_timeout, probe).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(SyncLensError::ConnectFailed(e.to_string())),
            Err(_) => Err(SyncLensError::ConnectFailed(format!(
                "ping did not complete within {:?}",
                self.probe_timeout
            ))),
        }
    }
}
