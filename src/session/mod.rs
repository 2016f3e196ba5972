// Module for server-side session management
pub mod store;
pub mod credentials;

pub use store::{SessionData, SessionStore};
pub use credentials::{CredentialResolver, credential_payload, CONNECTION_STRING_KEY, ENDPOINT_URL_KEY};
