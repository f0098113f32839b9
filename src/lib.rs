//! Urban emotion mapping engine.
//!
//! Scores a city's venues for emotional climate by combining category
//! baselines with crowd pressure, time of day, and live weather. A
//! random-forest regressor retrained on each snapshot projects scores for
//! the coming days, and per-district warnings flag regions whose mean
//! score or crowd density crosses a threshold. Venue and weather data come
//! from the Amap web services, with a file-backed cache between runs.
//!
//! `EmotionEngine` ties the stages together. `AmapClient` is the stock
//! gateway and `FileCacheStore` the stock cache; both sit behind traits so
//! tests and alternative providers can swap in.

pub mod amap;
pub mod cache;
pub mod config;
pub mod engine;
pub mod errors;
pub mod forecast;
pub mod forest;
pub mod gateway;
mod helpers;
pub mod models;
pub mod scoring;
pub mod warnings;

pub use amap::AmapClient;
pub use cache::{CacheStore, FileCacheStore};
pub use config::EngineConfig;
pub use engine::EmotionEngine;
pub use errors::EngineError;
pub use gateway::VenueGateway;
pub use models::{EmotionSnapshot, Venue, VenueCategory};
pub use scoring::{CategoryProfile, ScoringTables};
