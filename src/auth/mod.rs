// Authentication module
// Token storage, credential attachment and single-flight refresh

mod authenticator;
mod hook;
mod refresh;
mod token_store;
mod types;

pub use authenticator::authenticate;
pub use hook::{LogTermination, SessionTerminationHook};
pub use refresh::{RefreshCoordinator, Replay};
pub use token_store::TokenStore;
pub use types::{AccessToken, TokenResponse};
