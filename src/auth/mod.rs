pub mod clients;
pub mod codes;
pub mod middleware;
pub mod oauth;
pub mod pkce;
pub mod rate_limit;
pub mod scopes;
pub mod token_service;
pub mod tokens;

pub use middleware::*;
pub use scopes::*;
pub use tokens::*;
