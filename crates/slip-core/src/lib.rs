//! Core library for receipt scanning.
//!
//! This crate provides:
//! - A client for the Gemini `generateContent` endpoint
//! - Receipt image to expense extraction
//! - Expense data models and configuration

pub mod error;
pub mod extractor;
pub mod gemini;
pub mod models;

pub use error::{ReceiptError, Result};
pub use extractor::ReceiptExtractor;
pub use models::config::SlipConfig;
pub use models::expense::{Category, ExpenseItem, ScannedExpense};

/// Re-export of the decimal type used for amounts.
pub use rust_decimal::Decimal;
