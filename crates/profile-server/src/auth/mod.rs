mod identity;
mod jwt;
mod middleware;

pub use identity::{FirebaseIdentity, IdentityProvider, VerifiedIdentity};
pub use jwt::{create_session_token, verify_session_token, Claims};
pub use middleware::{auth_middleware, AuthUser};
