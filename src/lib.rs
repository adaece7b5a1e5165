//! # Page Capture
//!
//! Loads a single web page in headless Chrome, waits until the page is ready
//! and writes one snapshot of it to disk. The snapshot format is chosen from
//! the output file's extension or an explicit format identifier.
//!
//! ## When Is A Page Ready?
//!
//! A capture is taken exactly once, by whichever of these triggers fires first:
//!
//! | Trigger | Condition | Fires |
//! |---------|-----------|-------|
//! | **ready** | initial layout done *and* document load finished (successfully or not) | after the configured delay |
//! | **alert** | page script calls `alert(text)` with the expected text | ~10 ms later |
//! | **max-wait** | the max-wait deadline elapses | immediately |
//!
//! When an expected alert text is configured the `ready` trigger is gated off,
//! so the page decides when it is done. A failed load still produces a
//! snapshot of whatever was rendered.
//!
//! ## Output Formats
//!
//! | Kind | Identifiers |
//! |------|-------------|
//! | Vector | `svg` |
//! | Print | `pdf`, `ps` |
//! | Text | `itext` (inner text), `html`, `rtree` (layout dump) |
//! | Raster | `png`, `jpeg`, `gif`, `bmp`, `tiff`, `ppm`, `mng`, `xbm`, `xpm` |
//!
//! Extensions (`.svg`, `.pdf`, `.ps`, `.txt`, `.html`, `.rtree`, `.jpeg`,
//! `.png`, ...) are matched case-insensitively against the end of the output
//! path; when none matches, pass the format identifier explicitly.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use page_capture::{
//!     page_events, parse_target_url, CaptureConfig, CaptureSession, ChromePageHost, Config,
//!     PageRequest,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let url = parse_target_url("https://example.com")?;
//!     let config = CaptureConfig::new(
//!         PageRequest::get(url),
//!         "example.png".into(),
//!         None,
//!         Config::default(),
//!     )?;
//!
//!     let (sink, events) = page_events();
//!     let host = ChromePageHost::launch(&config, sink).await?;
//!     let outcome = CaptureSession::new(config, host, events).run().await?;
//!     println!("Captured {} bytes ({})", outcome.snapshot.bytes, outcome.trigger);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! page-capture capture --url https://example.com --out example.png
//! page-capture capture --url https://example.com --out page.pdf --page-size letter
//! page-capture capture --url https://example.com --out page.txt --out-format itext \
//!     --expect-alert done --max-wait 30000
//! page-capture capture --url localhost:8080 --out app.png --zoom-factor 1.5
//! page-capture formats
//! ```

/// Settings, requests and Chrome launch configuration
pub mod config;

/// Error types and exit-code classification
pub mod error;

/// Output format table and inference
pub mod format;

/// Readiness state machine deciding when to capture
pub mod readiness;

/// The rendering engine contract and its event channel
pub mod page_host;

/// Headless Chrome implementation of the page host
pub mod chrome_host;

/// JavaScript evaluated inside the page
pub mod scripts;

/// Render and print surfaces handed to the page host
pub mod surface;

/// Raster and PostScript encoders
pub mod encode;

/// Snapshot serialization and format dispatch
pub mod snapshot;

/// One capture run from load to written snapshot
pub mod session;

/// Command-line interface implementation
pub mod cli;

/// Capture counters and timing histograms
pub mod metrics;

/// Utility functions and helpers
pub mod utils;


pub use crate::metrics::Metrics;
pub use chrome_host::*;
pub use cli::*;
pub use config::*;
pub use encode::*;
pub use error::*;
pub use format::*;
pub use page_host::*;
pub use readiness::*;
pub use session::*;
pub use snapshot::*;
pub use surface::*;
pub use utils::*;
