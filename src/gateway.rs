//! Gateway abstraction over the external venue/weather provider.
//!
//! The engine only consumes the records a gateway returns; pagination shape,
//! pacing, and wire details live behind this trait. Tests drive the engine
//! with scripted in-memory implementations.

use async_trait::async_trait;

use crate::errors::EngineError;
use crate::models::{Venue, VenueCategory, WeatherReport};

#[async_trait]
pub trait VenueGateway: Send + Sync {
    /// Fetch one page of venues for a category. An empty page marks the end
    /// of pagination. Transport failures and non-success provider statuses
    /// surface as `GatewayUnavailable`, undecodable payloads as
    /// `MalformedResponse`.
    async fn fetch_venue_page(
        &self,
        city: &str,
        category: VenueCategory,
        page: u32,
    ) -> Result<Vec<Venue>, EngineError>;

    /// Fetch the current weather report (live observation plus daily
    /// outlook) for a city.
    async fn fetch_weather(&self, city: &str) -> Result<WeatherReport, EngineError>;
}
