// Module for the cached connection to the destination cluster
pub mod connection_cache;
pub mod connection_string;
pub mod mongo;

pub use connection_cache::{ConnectionCache, Connector, PoolOptions};
pub use mongo::MongoConnector;
