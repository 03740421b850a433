//! Marker catalog storage.
//!
//! The catalog holds the small set of Dengue serotype marker fragments ("sankets")
//! that reads are screened against. It is loaded once, before any read is processed,
//! and is read-only for the lifetime of a run.
//!
//! ## Formats
//!
//! - **CSV** (`sanket.csv`): header row followed by
//!   `sid,sanket,s_len,serotype,ssr_count,mlen_avg,mrc_avg,p_count,plen_avg`
//! - **JSON**: the export format written by `bhedi catalog export`
//!
//! ## Example
//!
//! ```rust,no_run
//! use bhedi::MarkerCatalog;
//! use std::path::Path;
//!
//! let catalog = MarkerCatalog::load_from_file(Path::new("sanket.csv")).unwrap();
//! for marker in &catalog {
//!     println!("{} {} {}", marker.id, marker.serotype, marker.length);
//! }
//! ```

pub mod store;

pub use store::{CatalogError, MarkerCatalog};
