//! Data models for slip.

pub mod config;
pub mod expense;
