//! Identity, sessions and clinical entity store for a patient records backend.
//!
//! The crate exposes three cooperating pieces: a typed [`db::Database`] that
//! persists the clinical entities and enforces uniqueness and referential
//! integrity at the storage boundary, password hashing in
//! [`utils::password_utils`], and a [`services::Service`] facade that handles
//! registration, login, server-side sessions and the gated entity operations.
//!
//! The HTTP layer is deliberately absent: every operation returns structured
//! results or typed failures and never renders a response body.

pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod session;
pub mod utils;

pub use config::Config;
pub use models::{Principal, Role};
pub use services::Service;
pub use session::{MemorySessionStore, SessionStore, SessionToken};
