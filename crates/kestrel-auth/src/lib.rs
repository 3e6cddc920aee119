//! The AuthN/AuthZ boundary layer: the only place in the kernel that
//! knows what a credential looks like or what a scope means.

pub mod audit;
pub mod credential;
pub mod jwt;
pub mod login;
pub mod password;
pub mod policy;
pub mod rate_limit;

pub use credential::{CredentialSource, RequestContext};
pub use jwt::{Claims, TokenPair, TokenType};
pub use login::{LoginError, USERS_NAMESPACE};
pub use policy::{AuthError, AuthorizationPolicy};
pub use rate_limit::RateLimiter;
