//! Engine run configuration.

use crate::errors::EngineError;
use crate::models::VenueCategory;

/// Fallback regional warning threshold.
pub const DEFAULT_WARNING_THRESHOLD: f64 = 0.8;
/// Fallback forecast horizon in days.
pub const DEFAULT_FUTURE_DAYS: u32 = 7;

/// Everything one engine run is parameterized by. All caller-supplied; there
/// is no environment or global state behind it.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// City the venue and weather queries are scoped to.
    pub city: String,
    /// Categories to acquire and score, in acquisition order.
    pub categories: Vec<VenueCategory>,
    /// Regional warning threshold; strict comparisons against `-threshold`
    /// (emotion) and `threshold * 10000` (density).
    pub warning_threshold: f64,
    /// Forecast horizon in days, starting from the run date.
    pub future_days: u32,
    /// Bypass cache reads while still writing fresh results.
    pub force_update: bool,
}

impl EngineConfig {
    /// Configuration for `city` over every category, with the defaults:
    /// threshold 0.8, 7 forecast days, cache reads enabled.
    pub fn new(city: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            categories: VenueCategory::ALL.to_vec(),
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
            future_days: DEFAULT_FUTURE_DAYS,
            force_update: false,
        }
    }

    pub fn with_categories(mut self, categories: Vec<VenueCategory>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_warning_threshold(mut self, threshold: f64) -> Self {
        self.warning_threshold = threshold;
        self
    }

    pub fn with_future_days(mut self, days: u32) -> Self {
        self.future_days = days;
        self
    }

    pub fn with_force_update(mut self, force: bool) -> Self {
        self.force_update = force;
        self
    }

    /// Reject configurations the pipeline cannot run under.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.city.trim().is_empty() {
            return Err(EngineError::InvalidConfig("city must not be empty".to_string()));
        }
        if self.categories.is_empty() {
            return Err(EngineError::InvalidConfig(
                "at least one category is required".to_string(),
            ));
        }
        if !self.warning_threshold.is_finite() || self.warning_threshold <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "warning_threshold must be positive, got {}",
                self.warning_threshold
            )));
        }
        if self.future_days == 0 {
            return Err(EngineError::InvalidConfig(
                "future_days must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
