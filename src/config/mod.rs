//! Configuration constants
//!
//! - [`defaults`] - Default values for timeouts, retries and file names
//! - [`urls`] - UUP dump endpoints

pub mod defaults;
pub mod urls;
