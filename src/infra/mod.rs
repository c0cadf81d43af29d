//! Infrastructure layer
//!
//! Handles I/O: HTTP, HTML scraping, the catalog files, the conversion
//! scripts and the user directories.

pub mod catalog_store;
pub mod dirs;
pub mod filesystem;
pub mod http;
pub mod packager;
pub mod scrape;
pub mod transport;
