pub mod backend;
pub mod config;
pub mod credentials;
pub mod error;
pub mod manager;

pub use backend::{Backend, FirebaseBackend, Firestore, StorageBucket};
pub use config::Config;
pub use error::{BackendError, ClientError, InitError, InitErrorKind};
pub use manager::{ConnectionManager, InitStatus};
