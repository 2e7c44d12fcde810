//! Handlers a transport layer calls. Only `v1` exists today.

pub mod v1;
