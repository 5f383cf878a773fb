//! Canva Connect OAuth authentication library
//!
//! Provides PKCE flow generation, pending-authorization bookkeeping, token
//! exchange/refresh, and the access-token lifecycle for the autofill gateway.
//! No dependency on the HTTP boundary; everything here is testable alone.
//!
//! Credential flow:
//! 1. Gateway calls `AuthorizationSessions::begin()` for state + PKCE pair
//! 2. User authorizes via `pkce::build_authorization_url()`
//! 3. Callback resolves the verifier with `AuthorizationSessions::resolve()`
//! 4. `TokenManager::authorize()` exchanges the code and stores the credential
//! 5. Every API call asks `TokenManager::get_valid()`, which refreshes lazily

pub mod config;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod manager;
pub mod pkce;
pub mod session;
pub mod token;

use std::future::Future;
use std::pin::Pin;

pub use config::ClientConfig;
pub use constants::*;
pub use credentials::{Credential, CredentialStore, MemoryCredentialStore};
pub use error::{Error, Result};
pub use manager::{TokenManager, TokenStatus};
pub use pkce::{build_authorization_url, compute_challenge, generate_state, generate_verifier};
pub use session::{
    AuthorizationRequest, AuthorizationSessions, MemorySessionStore, PendingAuthorization,
    SessionStore,
};
pub use token::{TokenClient, TokenExchange, TokenResponse};

/// Boxed future returned by the store and exchange traits so they stay
/// usable as trait objects.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
