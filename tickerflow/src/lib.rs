//! # Tickerflow
//! Per-ticker aggregation of institutional ownership, insider & congressional trades, options
//! flow, dark-pool prints and 13F filings across Financial Modeling Prep (FMP) and Unusual
//! Whales (UW).
//!
//! * **Normalised**: every provider payload maps into one [`CanonicalRecord`] shape per
//!   [`Category`], with lenient coercion of numbers, dates and sentinels.
//! * **Merged**: 13F filings reported by both providers collapse into one [`FilingRecord`]
//!   tagged with its [`Provenance`].
//! * **Cached**: per-(ticker, category) TTL cache with single-flight fetches, so repeated
//!   requests never re-hit the upstream APIs.
//! * **Isolated**: a failing provider or category never fails a whole [`Snapshot`].
//!
//! ## Examples
//! ```rust,no_run
//! use tickerflow::{Aggregator, Category};
//!
//! #[tokio::main]
//! async fn main() {
//!     // FMP_API_KEY and/or UW_API_KEY must be set
//!     let aggregator = Aggregator::from_env().unwrap();
//!
//!     let snapshot = aggregator
//!         .get_snapshot("AAPL", [Category::Options, Category::DarkPool], false)
//!         .await;
//!
//!     println!("put/call ratio: {}", snapshot.stats.options_flow.put_call_ratio);
//!     for (category, error) in snapshot.errors() {
//!         println!("{category} failed: {error}");
//!     }
//! }
//! ```

/// [`Aggregator`] façade, [`SnapshotRequest`] & [`Snapshot`].
pub mod aggregator;

/// Per-(ticker, category) TTL cache with single-flight fetches.
pub mod cache;

/// [`TickerKey`], [`Category`] & [`Provider`] identifiers.
pub mod category;

/// [`AggregatorConfig`] and its environment loader.
pub mod config;

/// All [`Error`](std::error::Error)s generated in Tickerflow.
pub mod error;

/// Cross-provider filing merge & [`FilingQuery`](merge::FilingQuery).
pub mod merge;

/// [`CanonicalRecord`], [`Provenance`] & filing identity.
pub mod model;

/// Provider-native record to [`CanonicalRecord`] mapping.
pub mod normalise;

/// [`SourceAdapter`](provider::SourceAdapter) contract and the FMP & UW implementations.
pub mod provider;

/// [`DerivedStats`](stats::DerivedStats) over resolved category data.
pub mod stats;

pub use aggregator::{Aggregator, CategorySelection, CategoryView, Snapshot, SnapshotRequest};
pub use cache::{CacheKey, CacheStore, LoadState};
pub use category::{Category, Provider, TickerKey};
pub use config::AggregatorConfig;
pub use model::{CanonicalRecord, FilingRecord, Provenance};
