//! Pipeline orchestrator.
//!
//! One `run` walks the stages in order: resolve the local time context,
//! acquire weather and venues (cache first, gateway on miss), score every
//! venue, retrain and project the forecast, generate regional warnings, and
//! assemble the snapshot. Failures degrade instead of aborting: a weather
//! failure falls back to neutral scoring, a failed category is skipped, a
//! venue without a category profile is skipped, and an empty training set
//! only empties the forecast section.

use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::cache::{self, CacheNamespace, CacheStore};
use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::forecast::Forecaster;
use crate::gateway::VenueGateway;
use crate::helpers::round2;
use crate::models::{
    EmotionSnapshot, ForecastSample, ScoredVenue, TimeContext, Venue, VenueCategory,
    WeatherObservation, WeatherReport,
};
use crate::scoring::{compose_score, ScoringTables};
use crate::warnings::generate_warnings;

/// Upper bound on venue pages fetched per category. A gateway that never
/// returns an empty page stops here instead of looping forever; real
/// category listings page out at 25/page long before this.
const MAX_VENUE_PAGES: u32 = 100;

/// The emotion scoring pipeline over one city.
pub struct EmotionEngine {
    config: EngineConfig,
    tables: ScoringTables,
    gateway: Arc<dyn VenueGateway>,
    cache: Option<Arc<dyn CacheStore>>,
    forecaster: Forecaster,
}

impl EmotionEngine {
    /// Engine over the stock scoring tables, with no cache store attached.
    pub fn new(config: EngineConfig, gateway: Arc<dyn VenueGateway>) -> Result<Self, EngineError> {
        Self::with_tables(config, gateway, ScoringTables::default())
    }

    /// Engine over caller-supplied scoring tables. Fails fast when the
    /// configuration is invalid or a configured category has no profile.
    pub fn with_tables(
        config: EngineConfig,
        gateway: Arc<dyn VenueGateway>,
        tables: ScoringTables,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        tables.validate(&config.categories)?;
        Ok(Self {
            config,
            tables,
            gateway,
            cache: None,
            forecaster: Forecaster::new(),
        })
    }

    /// Attach a cache store. Without one every run fetches from the gateway.
    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// One full pipeline run at the current local wall clock.
    pub async fn run(&mut self) -> EmotionSnapshot {
        self.run_at(Local::now().naive_local()).await
    }

    /// One full pipeline run at an explicit local time. Tests pin the clock
    /// through this entry point.
    pub async fn run_at(&mut self, now: NaiveDateTime) -> EmotionSnapshot {
        let context = TimeContext::from_local(now);
        tracing::info!(
            "Starting emotion run for {}: {} {} ({})",
            self.config.city,
            context.date,
            context.bucket,
            if context.is_weekend() { "weekend" } else { "weekday" },
        );

        // 1. Weather; a failure degrades scoring to the neutral path.
        let report = self.acquire_weather(context.date).await;
        let observation = report.as_ref().and_then(WeatherReport::observation);

        // 2. Venues per category; nothing at all ends the run early.
        let venues = self.acquire_venues().await;
        if venues.is_empty() {
            tracing::warn!(
                "No venues acquired for {}; emitting an empty snapshot",
                self.config.city
            );
            return self.assemble(context, observation, Vec::new(), Vec::new(), Vec::new());
        }

        // 3. Score.
        let (scored, samples) = self.score_venues(&venues, &context, observation.as_ref());

        // 4. Forecast; an empty training set empties only this section.
        let forecasts = match self
            .forecaster
            .predict(&samples, context.date, self.config.future_days)
        {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Forecast stage skipped: {}", e);
                Vec::new()
            }
        };

        // 5. Warnings, then emit.
        let warnings = generate_warnings(&scored, self.config.warning_threshold);

        tracing::info!(
            "Run complete for {}: {} venues scored, {} forecast cells, {} warnings",
            self.config.city,
            scored.len(),
            forecasts.len(),
            warnings.len(),
        );

        self.assemble(context, observation, scored, forecasts, warnings)
    }

    fn assemble(
        &self,
        context: TimeContext,
        weather: Option<WeatherObservation>,
        venues: Vec<ScoredVenue>,
        forecasts: Vec<crate::models::ForecastEntry>,
        warnings: Vec<crate::models::RegionWarning>,
    ) -> EmotionSnapshot {
        EmotionSnapshot {
            run_id: Uuid::new_v4(),
            city: self.config.city.clone(),
            generated_at: Utc::now(),
            context,
            weather,
            venues,
            forecasts,
            warnings,
        }
    }

    // --- acquisition ---

    async fn acquire_weather(&self, today: NaiveDate) -> Option<WeatherReport> {
        let key = cache::weather_key(&self.config.city, today);

        if !self.config.force_update {
            if let Some(cached) = self.cache_get(CacheNamespace::Weather, &key) {
                match serde_json::from_value::<WeatherReport>(cached) {
                    Ok(report) => {
                        tracing::debug!("Weather cache hit for {}", key);
                        return Some(report);
                    }
                    Err(e) => {
                        tracing::warn!("Discarding undecodable weather cache entry {}: {}", key, e)
                    }
                }
            }
        }

        match self.gateway.fetch_weather(&self.config.city).await {
            Ok(report) => {
                self.cache_put(CacheNamespace::Weather, &key, &report);
                Some(report)
            }
            Err(e) => {
                tracing::warn!("Weather fetch failed, scoring with neutral weather: {}", e);
                None
            }
        }
    }

    async fn acquire_venues(&self) -> Vec<Venue> {
        let mut all = Vec::new();
        for &category in &self.config.categories {
            match self.acquire_category(category).await {
                Ok(venues) if venues.is_empty() => {
                    tracing::warn!(
                        "No {} venues found for {}; skipping category",
                        category,
                        self.config.city
                    );
                }
                Ok(mut venues) => {
                    tracing::info!(
                        "Acquired {} {} venues for {}",
                        venues.len(),
                        category,
                        self.config.city
                    );
                    all.append(&mut venues);
                }
                Err(e) => {
                    tracing::warn!("Acquisition of {} venues failed, skipping category: {}", category, e)
                }
            }
        }
        all
    }

    /// One category's full venue list: cache hit, or pages `1, 2, ...` from
    /// the gateway until an empty page. A page failure discards the whole
    /// partial list; nothing partial is ever cached. Empty results are not
    /// cached either, so a later run retries the category.
    async fn acquire_category(&self, category: VenueCategory) -> Result<Vec<Venue>, EngineError> {
        let key = cache::venue_key(&self.config.city, category);

        if !self.config.force_update {
            if let Some(cached) = self.cache_get(CacheNamespace::Venues, &key) {
                match serde_json::from_value::<Vec<Venue>>(cached) {
                    Ok(venues) => {
                        tracing::debug!("Venue cache hit for {}", key);
                        return Ok(venues);
                    }
                    Err(e) => {
                        tracing::warn!("Discarding undecodable venue cache entry {}: {}", key, e)
                    }
                }
            }
        }

        let mut venues = Vec::new();
        for page in 1..=MAX_VENUE_PAGES {
            let batch = self
                .gateway
                .fetch_venue_page(&self.config.city, category, page)
                .await?;
            if batch.is_empty() {
                break;
            }
            venues.extend(batch);
            if page == MAX_VENUE_PAGES {
                tracing::warn!(
                    "{} pagination for {} stopped at the {}-page bound",
                    category,
                    self.config.city,
                    MAX_VENUE_PAGES
                );
            }
        }

        if !venues.is_empty() {
            self.cache_put(CacheNamespace::Venues, &key, &venues);
        }
        Ok(venues)
    }

    // --- scoring ---

    fn score_venues(
        &self,
        venues: &[Venue],
        context: &TimeContext,
        observation: Option<&WeatherObservation>,
    ) -> (Vec<ScoredVenue>, Vec<ForecastSample>) {
        let mut scored = Vec::with_capacity(venues.len());
        let mut samples = Vec::with_capacity(venues.len());

        for venue in venues {
            let breakdown = match compose_score(&self.tables, venue, context, observation) {
                Ok(breakdown) => breakdown,
                Err(e) => {
                    tracing::warn!("Skipping venue '{}': {}", venue.name, e);
                    continue;
                }
            };

            scored.push(ScoredVenue {
                name: venue.name.clone(),
                category: venue.category,
                region: venue.region.clone(),
                longitude: venue.longitude,
                latitude: venue.latitude,
                address: venue.address.clone(),
                emotion_score: round2(breakdown.score),
                time_bucket: context.bucket,
                weather: observation.map(|o| o.kind),
                temperature_c: observation.map(|o| o.temperature_c),
                crowd_density: breakdown.crowd_density,
                is_weekend: context.is_weekend(),
            });
            samples.push(ForecastSample {
                crowd_density: breakdown.crowd_density,
                time_weight: breakdown.time_weight,
                weather_score: breakdown.weather_weight,
                is_weekend: context.is_weekend(),
                label: breakdown.score,
            });
        }

        (scored, samples)
    }

    // --- cache plumbing ---

    fn cache_get(&self, namespace: CacheNamespace, key: &str) -> Option<Value> {
        self.cache.as_ref()?.get(namespace, key)
    }

    /// Best effort: a failed cache write is logged and never fails the run.
    fn cache_put<T: Serialize>(&self, namespace: CacheNamespace, key: &str, payload: &T) {
        let Some(store) = self.cache.as_ref() else {
            return;
        };
        match serde_json::to_value(payload) {
            Ok(value) => {
                if let Err(e) = store.put(namespace, key, value) {
                    tracing::warn!("Cache write for {} failed: {}", key, e);
                }
            }
            Err(e) => tracing::warn!("Cache encoding for {} failed: {}", key, e),
        }
    }
}
