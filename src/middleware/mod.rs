//! HTTP 中间件

mod admin_auth;

pub use admin_auth::{authenticate, AdminAuthLayer, CallerRole};
