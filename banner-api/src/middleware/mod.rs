//! Middleware modules for the banner API
//!
//! - `auth`: role-token authentication and authorization

mod auth;

pub use auth::{
    auth_middleware, AuthMiddlewareError, AuthMiddlewareState, RoleExtractor, TOKEN_HEADER,
};
