//! Upload server for screening sequence files over HTTP.
//!
//! Each upload is spooled to a temporary file, screened with the same pipeline as
//! `bhedi screen`, and answered with the resulting Parquet table.
//!
//! ## Starting the Server
//!
//! ```text
//! # Start on default port 3000
//! bhedi serve --catalog sanket.csv
//!
//! # Keep a copy of every result and bind to all interfaces
//! bhedi serve --address 0.0.0.0 --output-dir results
//! ```
//!
//! ## API Endpoints
//!
//! - `POST /upload` - Screen the FASTQ/FASTA file in the `file` multipart field
//! - `GET /api/catalog` - List all markers in the loaded catalog
//! - `GET /health` - Liveness and catalog size

pub mod server;
