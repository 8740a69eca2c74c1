//! HTTP handlers for the annotation server

pub mod assets;
pub mod auth;
pub mod health;
pub mod pages;
mod views;

pub use assets::static_routes;
pub use auth::{auth_middleware, AuthenticatedUser};
pub use health::health_routes;
pub use pages::page_routes;
