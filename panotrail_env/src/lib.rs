//! Panotrail Environment Abstraction Layer
//!
//! This crate isolates the two places where a navigation session touches
//! the outside world:
//! - Time (`now()`, `sleep()`) for the deferred viewer initialization
//! - Network (`fetch()`) for image bytes requested by the viewer engine
//!
//! Production code uses [`TokioContext`] and [`HttpFetcher`]; the simulation
//! harness swaps in a virtual clock and an in-memory fetcher so every
//! session can be replayed deterministically.
//!
//! # Example
//!
//! ```ignore
//! use panotrail_env::{HttpFetcher, ImageFetcher};
//!
//! async fn load(fetcher: &HttpFetcher, url: &str) {
//!     match fetcher.fetch(url).await {
//!         Ok(bytes) => render(bytes),
//!         Err(e) => eprintln!("{} failed: {}", e.url(), e),
//!     }
//! }
//! ```

mod context;
mod error;
mod fetch;
mod http;
mod tokio_impl;

pub use context::SessionContext;
pub use error::FetchError;
pub use fetch::ImageFetcher;
pub use http::HttpFetcher;
pub use tokio_impl::TokioContext;
