// Session Client - library root

pub mod account;
pub mod auth;
pub mod config;
pub mod error;
pub mod http_client;
pub mod request;
pub mod transport;

pub use account::AccountApi;
pub use auth::{AccessToken, SessionTerminationHook, TokenStore};
pub use config::ClientSettings;
pub use error::{Result, SessionError};
pub use http_client::SessionClient;
pub use request::{ApiResponse, RequestDescriptor};
pub use transport::{ReqwestTransport, Transport};
