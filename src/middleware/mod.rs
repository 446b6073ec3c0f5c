//! Request-processing layers and extractors.
//!
//! - `auth`: bearer-token validation and per-handler role requirements
//! - `rate_limit`: per-IP sliding-window limits, global and per endpoint
//! - `security_headers`: response hardening headers
//! - `validation`: early rejection of oversized or non-JSON bodies

pub mod auth;
pub mod rate_limit;
pub mod security_headers;
pub mod validation;

pub use auth::{AuthenticatedUser, CreateRole, RequireRole, TokenValidator, ViewRole};
pub use rate_limit::{EndpointRateLimiter, RateLimiter};
