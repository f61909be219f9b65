//! Access-token authentication plumbing.
//!
//! Access tokens are stateless: the extractor verifies the signature and
//! expiry without touching the database. Refresh tokens are handled by the
//! session manager, not here.

mod cookie;
mod errors;
mod extractors;

pub use cookie::{
    ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, clear_cookie, get_cookie, session_cookie,
};
pub use errors::ApiAuthError;
pub use extractors::{ApiAuth, AuthenticatedAccount, HasAuthState};
