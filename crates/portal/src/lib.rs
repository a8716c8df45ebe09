//! Portal - shared building blocks for the telehealth portal.
//!
//! This crate holds everything the server and the cleanup worker share that
//! is not tied to the HTTP surface or the database schema.
//!
//! # Modules
//!
//! - [`config`] - `portal.toml` loading with defaults for every section
//! - [`codes`] - magic-link codes, session tokens and email normalization
//! - [`integrations`] - outbound HTTP clients (registry, video, LLM, fax, email)

pub mod codes;
pub mod config;
pub mod integrations;
