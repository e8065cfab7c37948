//! Utility functions.

pub mod format;
pub mod time;

pub use format::{format_credits, format_price, format_tokens};
pub use time::format_relative_time;
