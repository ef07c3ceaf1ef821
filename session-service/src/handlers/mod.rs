pub mod audit;
pub mod auth;
pub mod health;
pub mod sessions;
