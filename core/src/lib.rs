//! Core library for comparing answers from several LLM providers.
//!
//! Each module keeps one responsibility so the boundaries stay obvious:
//! - [`providers`] wraps each vendor (and the local model) behind one trait.
//! - [`registry`] maps provider ids to adapters and fans out catalogue lookups.
//! - [`store`] is the append-only SQLite log of generation records.
//! - [`aggregation`] rebuilds per-prompt comparison groups and applies preferences.
//! - [`orchestrator`] runs a prompt against a provider and persists the result.
//! - [`api`] exposes the handlers a transport layer calls.
//! - [`config`], [`db`], [`errors`] and [`logging`] carry the ambient concerns.

pub mod aggregation;
pub mod api;
pub mod config;
pub mod db;
pub mod errors;
pub mod logging;
pub mod orchestrator;
pub mod providers;
pub mod registry;
pub mod store;
