pub mod auth;
pub mod client;

pub use auth::{admin_middleware, auth_middleware, AuthUser};
pub use client::Client;
