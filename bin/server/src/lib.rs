//! uitid-connect web server.
//!
//! This crate provides the axum HTTP surface that links local accounts to
//! UiTID: the OAuth 1.0a handshake endpoints, the auto-login interceptor, the
//! link-status route gate, and the Postgres and UiTID REST backends behind
//! them.

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod locale;
pub mod pages;
