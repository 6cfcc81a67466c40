//! Core library for the `climate` CLI.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Chunked, concurrent retrieval of long observation ranges
//! - Clients for the NOAA NCDC and World Bank document APIs
//! - Shared domain models (ranges, queries, records, reports)
//!
//! It is used by `climate-cli`, but can also be reused by other binaries or services.

pub mod config;
pub mod error;
pub mod fetcher;
pub mod model;
pub mod provider;
pub mod temperature;

pub use config::{Config, FetchConfig, ProviderConfig};
pub use error::{FetchError, ProviderError, ValidationError};
pub use fetcher::{RangeChunkingFetcher, WindowFetcher, split_into_windows};
pub use model::{DateRange, DocumentQuery, ObservationRecord, Query, RawObservation, Units};
pub use provider::{ProviderId, ncdc::NcdcClient, worldbank::WorldBankClient};
pub use temperature::{ErrorPayload, TemperatureReport, TemperatureRequest, fetch_temperature};
