//! Canva Connect OAuth constants
//!
//! Endpoints and defaults for the Canva authorization server. The client id
//! and secret are deployment configuration, not constants; see
//! [`crate::ClientConfig`].

use std::time::Duration;

/// Authorization endpoint the user's browser is redirected to.
pub const AUTHORIZE_ENDPOINT: &str = "https://www.canva.com/api/oauth/authorize";

/// Token endpoint for code exchange and token refresh
pub const TOKEN_ENDPOINT: &str = "https://api.canva.com/rest/v1/oauth/token";

/// Redirect URI used when none is configured (local development).
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:3000/callback";

/// Scopes requested during authorization. Autofill needs the brand template
/// and design scopes; the rest match what the integration is registered for.
pub const SCOPES: &[&str] = &[
    "folder:permission:read",
    "design:content:read",
    "app:write",
    "design:content:write",
    "folder:read",
    "folder:write",
    "folder:permission:write",
    "asset:read",
    "design:permission:read",
    "design:permission:write",
    "brandtemplate:content:read",
    "comment:read",
    "profile:read",
    "brandtemplate:meta:read",
    "comment:write",
    "design:meta:read",
    "app:read",
    "asset:write",
];

/// Key of the single credential slot.
pub const DEFAULT_ACCOUNT: &str = "default";

/// A credential is only handed out while it has more than this left.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Pending authorizations older than this are rejected and swept.
pub const SESSION_TTL: Duration = Duration::from_secs(10 * 60);

/// Timeout for every token endpoint call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
