//! Nursery fixtures CLI
//!
//! Command-line access to cleanup, seeding, login checks and the hook table
//! of the nursery E2E fixture manager.

pub mod commands;
pub mod context;
pub mod output;
