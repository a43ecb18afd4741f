//! Core identifiers and utilities for uitid-connect.
//!
//! This crate provides the foundational types shared by the identity
//! library and the web server that links local accounts to UiTID.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{AccountId, ParseIdError};
