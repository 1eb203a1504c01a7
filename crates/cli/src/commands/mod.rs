//! CLI Commands

pub mod auth;
pub mod cleanup;
pub mod hooks;
pub mod seed;
