//! smartmarks: a personal bookmark manager client.
//!
//! The core is `managers::sync_controller`: it mirrors the signed-in session,
//! keeps the user's bookmark list in sync with the record service, and
//! refreshes on change-feed notifications. Collaborators live in `services`,
//! with a hosted Supabase implementation and a local SQLite one.
//!
//! This library crate exposes all modules for use by the binary and integration tests.

pub mod app;
pub mod database;
pub mod managers;
pub mod platform;
pub mod rpc_handler;
pub mod services;
pub mod types;
