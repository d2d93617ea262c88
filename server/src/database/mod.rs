pub mod create;
pub mod tokens;
pub mod users;
pub mod utils;

pub use create::{open_credentials_database, open_memory_pool, open_sessions_database};
pub use tokens::{SessionError, SessionRecord, SessionStore, SqliteSessionStore};
pub use users::{AuthResult, CredentialError, CredentialGateway, SqliteCredentialStore, User};
