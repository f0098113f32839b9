//! Signal estimators and the emotion score composer.
//!
//! All numeric tables live here as immutable structures: per-category
//! profiles and capacities, the (day type, time bucket) weights, and the
//! weather condition weights. The estimators and the composer are pure
//! functions over these tables.

use std::collections::HashMap;

use crate::errors::EngineError;
use crate::models::{DayType, TimeBucket, TimeContext, Venue, VenueCategory, WeatherKind, WeatherObservation};

// ---------------------------------------------------------------------------
// Model constants
// ---------------------------------------------------------------------------

/// Share of the category baseline in the composed score.
const BASE_MIX: f64 = 0.4;
/// Share of the crowd term in the composed score.
const CROWD_MIX: f64 = 0.2;
/// Share of the time term in the composed score.
const TIME_MIX: f64 = 0.2;
/// Share of the weather term in the composed score.
const WEATHER_MIX: f64 = 0.2;

/// Density at which the crowd term reaches zero. Beyond it the term goes
/// negative, an overcrowding penalty that is kept unclamped.
pub(crate) const CROWD_DENSITY_SCALE: f64 = 10_000.0;

/// Temperature (°C) of maximum comfort.
const COMFORT_PIVOT_C: f64 = 23.0;
/// Degrees of deviation over which comfort decays by 1.0.
const COMFORT_FALLOFF_C: f64 = 20.0;

/// Weather component when no observation is available; the comfort
/// adjustment is skipped on this path.
const NEUTRAL_WEATHER_COMPONENT: f64 = 0.5;

/// Rating factor for venues without a provider rating.
const NEUTRAL_RATING_FACTOR: f64 = 0.5;

/// Capacity for categories without an explicit capacity entry.
const DEFAULT_CAPACITY: f64 = 1000.0;

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// Per-category scoring constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryProfile {
    /// Baseline sentiment of the category; may be negative (hospitals).
    pub base_weight: f64,
    pub crowd_sensitivity: f64,
    pub time_sensitivity: f64,
    pub weather_sensitivity: f64,
}

impl CategoryProfile {
    /// Sensitivities must sit in [0, 1]; `base_weight` is unrestricted.
    fn check(&self, label: &str) -> Result<(), EngineError> {
        for (name, value) in [
            ("crowd_sensitivity", self.crowd_sensitivity),
            ("time_sensitivity", self.time_sensitivity),
            ("weather_sensitivity", self.weather_sensitivity),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::InvalidConfig(format!(
                    "{} of {} profile is {}, outside [0, 1]",
                    name, label, value
                )));
            }
        }
        Ok(())
    }
}

/// Immutable scoring tables handed to the engine at construction.
///
/// `Default` yields the stock table; callers supplying their own weights
/// build from `empty()` or override individual entries.
#[derive(Debug, Clone)]
pub struct ScoringTables {
    profiles: HashMap<VenueCategory, CategoryProfile>,
    capacities: HashMap<VenueCategory, f64>,
    fallback_profile: Option<CategoryProfile>,
}

impl Default for ScoringTables {
    fn default() -> Self {
        let entries: [(VenueCategory, CategoryProfile, f64); 8] = [
            (
                VenueCategory::Mall,
                CategoryProfile { base_weight: 0.7, crowd_sensitivity: 0.8, time_sensitivity: 0.7, weather_sensitivity: 0.5 },
                2000.0,
            ),
            (
                VenueCategory::Park,
                CategoryProfile { base_weight: 0.8, crowd_sensitivity: 0.6, time_sensitivity: 0.8, weather_sensitivity: 0.9 },
                1500.0,
            ),
            (
                VenueCategory::Hospital,
                CategoryProfile { base_weight: -0.3, crowd_sensitivity: 0.9, time_sensitivity: 0.5, weather_sensitivity: 0.3 },
                1000.0,
            ),
            (
                VenueCategory::School,
                CategoryProfile { base_weight: 0.5, crowd_sensitivity: 0.8, time_sensitivity: 0.9, weather_sensitivity: 0.6 },
                3000.0,
            ),
            (
                VenueCategory::Attraction,
                CategoryProfile { base_weight: 0.9, crowd_sensitivity: 0.7, time_sensitivity: 0.8, weather_sensitivity: 0.9 },
                2000.0,
            ),
            (
                VenueCategory::SportsVenue,
                CategoryProfile { base_weight: 0.7, crowd_sensitivity: 0.7, time_sensitivity: 0.8, weather_sensitivity: 0.8 },
                1000.0,
            ),
            (
                VenueCategory::CulturalVenue,
                CategoryProfile { base_weight: 0.6, crowd_sensitivity: 0.6, time_sensitivity: 0.7, weather_sensitivity: 0.5 },
                800.0,
            ),
            (
                VenueCategory::Dining,
                CategoryProfile { base_weight: 0.6, crowd_sensitivity: 0.9, time_sensitivity: 0.9, weather_sensitivity: 0.4 },
                200.0,
            ),
        ];

        let mut profiles = HashMap::new();
        let mut capacities = HashMap::new();
        for (category, profile, capacity) in entries {
            profiles.insert(category, profile);
            capacities.insert(category, capacity);
        }
        Self { profiles, capacities, fallback_profile: None }
    }
}

impl ScoringTables {
    /// Tables with no entries; pair with `with_profile` to build a custom set.
    pub fn empty() -> Self {
        Self {
            profiles: HashMap::new(),
            capacities: HashMap::new(),
            fallback_profile: None,
        }
    }

    /// Replace or add one category's profile.
    pub fn with_profile(mut self, category: VenueCategory, profile: CategoryProfile) -> Self {
        self.profiles.insert(category, profile);
        self
    }

    /// Replace or add one category's capacity.
    pub fn with_capacity(mut self, category: VenueCategory, capacity: f64) -> Self {
        self.capacities.insert(category, capacity);
        self
    }

    /// Opt into scoring categories that have no profile of their own. Without
    /// a fallback such venues fail with `UnknownCategory`.
    pub fn with_fallback_profile(mut self, profile: CategoryProfile) -> Self {
        self.fallback_profile = Some(profile);
        self
    }

    /// The profile applied to `category`: its own entry, else the fallback.
    pub fn profile(&self, category: VenueCategory) -> Option<&CategoryProfile> {
        self.profiles.get(&category).or(self.fallback_profile.as_ref())
    }

    /// Estimated capacity for `category`; 1000 without an explicit entry.
    pub fn capacity(&self, category: VenueCategory) -> f64 {
        self.capacities.get(&category).copied().unwrap_or(DEFAULT_CAPACITY)
    }

    /// Startup check: every configured category must resolve to a profile,
    /// and every profile (fallback included) must carry valid sensitivities.
    pub fn validate(&self, categories: &[VenueCategory]) -> Result<(), EngineError> {
        for (category, profile) in &self.profiles {
            profile.check(category.name())?;
        }
        if let Some(fallback) = &self.fallback_profile {
            fallback.check("fallback")?;
        }
        for category in categories {
            if self.profile(*category).is_none() {
                return Err(EngineError::InvalidConfig(format!(
                    "Category {} is configured but has no profile",
                    category
                )));
            }
        }
        Ok(())
    }
}

/// Fixed (day type, bucket) visit-propensity weights.
pub fn time_weight(day_type: DayType, bucket: TimeBucket) -> f64 {
    match (day_type, bucket) {
        (DayType::Weekday, TimeBucket::Morning) => 0.6,
        (DayType::Weekday, TimeBucket::Noon) => 0.4,
        (DayType::Weekday, TimeBucket::Afternoon) => 0.7,
        (DayType::Weekday, TimeBucket::Evening) => 0.8,
        (DayType::Weekend, TimeBucket::Morning) => 0.7,
        (DayType::Weekend, TimeBucket::Noon) => 0.6,
        (DayType::Weekend, TimeBucket::Afternoon) => 0.8,
        (DayType::Weekend, TimeBucket::Evening) => 0.9,
    }
}

/// Condition weight of a classified observation.
pub fn condition_weight(kind: WeatherKind) -> f64 {
    match kind {
        WeatherKind::Clear => 0.8,
        WeatherKind::Cloudy => 0.6,
        WeatherKind::Overcast => 0.4,
        WeatherKind::Rain => 0.3,
    }
}

// ---------------------------------------------------------------------------
// Estimators
// ---------------------------------------------------------------------------

/// Temperature comfort: `1 - |t - 23| / 20`.
///
/// Linear decay from 1.0 at 23°C, reaching 0.0 at 3°C and 43°C; the negative
/// tail beyond those points is kept.
pub fn temperature_comfort(temperature_c: f64) -> f64 {
    1.0 - (temperature_c - COMFORT_PIVOT_C).abs() / COMFORT_FALLOFF_C
}

/// Estimated crowd density: `capacity * time_weight * rating_factor`, with
/// `rating_factor = rating / 5` (0.5 when the venue has no rating).
pub fn estimate_crowd_density(tables: &ScoringTables, venue: &Venue, ctx: &TimeContext) -> f64 {
    let capacity = tables.capacity(venue.category);
    let tw = time_weight(ctx.day_type, ctx.bucket);
    let rating_factor = venue
        .rating
        .map(|r| r / 5.0)
        .unwrap_or(NEUTRAL_RATING_FACTOR);
    capacity * tw * rating_factor
}

/// Weather component before sensitivity scaling:
/// `condition_weight * comfort(t)`, or the neutral 0.5 (comfort skipped)
/// when there is no observation.
pub fn weather_component(observation: Option<&WeatherObservation>) -> f64 {
    match observation {
        Some(obs) => condition_weight(obs.kind) * temperature_comfort(obs.temperature_c),
        None => NEUTRAL_WEATHER_COMPONENT,
    }
}

// ---------------------------------------------------------------------------
// Composer
// ---------------------------------------------------------------------------

/// The composed score and the intermediate signals downstream stages reuse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    /// Unrounded composed score.
    pub score: f64,
    pub crowd_density: f64,
    pub time_weight: f64,
    /// Raw condition weight (neutral 0.5 without an observation); the
    /// forecaster's weather feature.
    pub weather_weight: f64,
}

/// Compose the emotion score for one venue.
///
/// ```text
/// score   = base_weight*0.4 + crowd*0.2 + time*0.2 + weather*0.2
/// crowd   = (1 - density/10000) * crowd_sensitivity
/// time    = time_weight * time_sensitivity
/// weather = weather_component * weather_sensitivity
/// ```
///
/// The crowd term goes negative past a density of 10000 and stays that way.
/// Fails with `UnknownCategory` when the venue's category resolves to no
/// profile.
pub fn compose_score(
    tables: &ScoringTables,
    venue: &Venue,
    ctx: &TimeContext,
    observation: Option<&WeatherObservation>,
) -> Result<ScoreBreakdown, EngineError> {
    let profile = *tables
        .profile(venue.category)
        .ok_or(EngineError::UnknownCategory(venue.category))?;

    let density = estimate_crowd_density(tables, venue, ctx);
    let tw = time_weight(ctx.day_type, ctx.bucket);

    let crowd_score = (1.0 - density / CROWD_DENSITY_SCALE) * profile.crowd_sensitivity;
    let time_score = tw * profile.time_sensitivity;
    let weather_score = weather_component(observation) * profile.weather_sensitivity;

    let score = profile.base_weight * BASE_MIX
        + crowd_score * CROWD_MIX
        + time_score * TIME_MIX
        + weather_score * WEATHER_MIX;

    let weather_weight = observation
        .map(|obs| condition_weight(obs.kind))
        .unwrap_or(NEUTRAL_WEATHER_COMPONENT);

    Ok(ScoreBreakdown {
        score,
        crowd_density: density,
        time_weight: tw,
        weather_weight,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::round2;

    use chrono::NaiveDate;

    fn weekday_morning() -> TimeContext {
        // 2024-05-15 is a Wednesday
        TimeContext::from_local(
            NaiveDate::from_ymd_opt(2024, 5, 15)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        )
    }

    fn park(rating: Option<f64>) -> Venue {
        Venue {
            name: "People's Park".to_string(),
            category: VenueCategory::Park,
            longitude: 118.05,
            latitude: 36.81,
            address: "Renmin West Road".to_string(),
            rating,
            region: "Zhangdian".to_string(),
        }
    }

    fn clear_at(temperature_c: f64) -> WeatherObservation {
        WeatherObservation {
            kind: WeatherKind::Clear,
            temperature_c,
        }
    }

    #[test]
    fn test_stock_table_park_profile() {
        let tables = ScoringTables::default();
        let profile = tables.profile(VenueCategory::Park).unwrap();
        assert_eq!(profile.base_weight, 0.8);
        assert_eq!(profile.crowd_sensitivity, 0.6);
        assert_eq!(profile.time_sensitivity, 0.8);
        assert_eq!(profile.weather_sensitivity, 0.9);
        assert_eq!(tables.capacity(VenueCategory::Park), 1500.0);
        assert_eq!(tables.capacity(VenueCategory::Dining), 200.0);
    }

    #[test]
    fn test_capacity_default_without_entry() {
        let tables = ScoringTables::empty();
        assert_eq!(tables.capacity(VenueCategory::Mall), 1000.0);
    }

    #[test]
    fn test_time_weight_table() {
        assert_eq!(time_weight(DayType::Weekday, TimeBucket::Morning), 0.6);
        assert_eq!(time_weight(DayType::Weekday, TimeBucket::Noon), 0.4);
        assert_eq!(time_weight(DayType::Weekday, TimeBucket::Evening), 0.8);
        assert_eq!(time_weight(DayType::Weekend, TimeBucket::Morning), 0.7);
        assert_eq!(time_weight(DayType::Weekend, TimeBucket::Evening), 0.9);
    }

    #[test]
    fn test_comfort_pivot_and_falloff() {
        assert!((temperature_comfort(23.0) - 1.0).abs() < 1e-12);
        assert!((temperature_comfort(13.0) - 0.5).abs() < 1e-12);
        assert!((temperature_comfort(43.0) - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_comfort_unclamped_negative() {
        // 50°C: 1 - 27/20 = -0.35
        assert!((temperature_comfort(50.0) - (-0.35)).abs() < 1e-12);
        assert!(temperature_comfort(-10.0) < 0.0);
    }

    #[test]
    fn test_crowd_density_no_rating() {
        let tables = ScoringTables::default();
        // 1500 * 0.6 * 0.5 = 450
        let density = estimate_crowd_density(&tables, &park(None), &weekday_morning());
        assert!((density - 450.0).abs() < 1e-9);
    }

    #[test]
    fn test_crowd_density_with_rating() {
        let tables = ScoringTables::default();
        // 1500 * 0.6 * (4.0/5) = 720
        let density = estimate_crowd_density(&tables, &park(Some(4.0)), &weekday_morning());
        assert!((density - 720.0).abs() < 1e-9);
    }

    #[test]
    fn test_weather_component_clear_pivot() {
        let component = weather_component(Some(&clear_at(23.0)));
        assert!((component - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_weather_component_neutral_without_observation() {
        assert_eq!(weather_component(None), 0.5);
    }

    #[test]
    fn test_compose_park_worked_example() {
        // density 450 → crowd (1-0.045)*0.6 = 0.573; time 0.6*0.8 = 0.48;
        // weather 0.8*1.0*0.9 = 0.72; score 0.32+0.1146+0.096+0.144 = 0.6746
        let tables = ScoringTables::default();
        let breakdown = compose_score(
            &tables,
            &park(None),
            &weekday_morning(),
            Some(&clear_at(23.0)),
        )
        .unwrap();
        assert!((breakdown.score - 0.6746).abs() < 1e-9);
        assert!((breakdown.crowd_density - 450.0).abs() < 1e-9);
        assert!((breakdown.time_weight - 0.6).abs() < 1e-12);
        assert!((breakdown.weather_weight - 0.8).abs() < 1e-12);
        assert_eq!(round2(breakdown.score), 0.67);
    }

    #[test]
    fn test_compose_deterministic() {
        let tables = ScoringTables::default();
        let a = compose_score(&tables, &park(None), &weekday_morning(), Some(&clear_at(25.0))).unwrap();
        let b = compose_score(&tables, &park(None), &weekday_morning(), Some(&clear_at(25.0))).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_compose_neutral_weather_path() {
        // weather term becomes 0.5*0.9 = 0.45 → score 0.32+0.1146+0.096+0.09 = 0.6206
        let tables = ScoringTables::default();
        let breakdown = compose_score(&tables, &park(None), &weekday_morning(), None).unwrap();
        assert!((breakdown.score - 0.6206).abs() < 1e-9);
        assert_eq!(breakdown.weather_weight, 0.5);
    }

    #[test]
    fn test_higher_rating_lowers_crowd_term() {
        let tables = ScoringTables::default();
        let ctx = weekday_morning();
        let sparse = compose_score(&tables, &park(None), &ctx, None).unwrap();
        let busy = compose_score(&tables, &park(Some(5.0)), &ctx, None).unwrap();
        assert!(busy.crowd_density > sparse.crowd_density);
        assert!(busy.score < sparse.score);
    }

    #[test]
    fn test_crowd_term_negative_past_scale() {
        // Capacity 40000 with rating 5: density = 40000*0.6*1.0 = 24000,
        // crowd term = (1 - 2.4) * 0.6 = -0.84
        let tables = ScoringTables::default().with_capacity(VenueCategory::Park, 40_000.0);
        let breakdown =
            compose_score(&tables, &park(Some(5.0)), &weekday_morning(), None).unwrap();
        assert!((breakdown.crowd_density - 24_000.0).abs() < 1e-9);
        let crowd_term = (1.0 - 24_000.0 / 10_000.0) * 0.6;
        assert!(crowd_term < 0.0);
        // base 0.32 + crowd -0.168 + time 0.096 + weather 0.09 = 0.338
        assert!((breakdown.score - 0.338).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_category_without_fallback() {
        let tables = ScoringTables::empty();
        let err = compose_score(&tables, &park(None), &weekday_morning(), None).unwrap_err();
        assert!(matches!(err, EngineError::UnknownCategory(VenueCategory::Park)));
    }

    #[test]
    fn test_fallback_profile_opt_in() {
        let fallback = CategoryProfile {
            base_weight: 0.5,
            crowd_sensitivity: 0.5,
            time_sensitivity: 0.5,
            weather_sensitivity: 0.5,
        };
        let tables = ScoringTables::empty().with_fallback_profile(fallback);
        let breakdown = compose_score(&tables, &park(None), &weekday_morning(), None).unwrap();
        // capacity defaults to 1000 → density 300; crowd (1-0.03)*0.5 = 0.485
        assert!((breakdown.crowd_density - 300.0).abs() < 1e-9);
        let expected = 0.5 * 0.4 + 0.485 * 0.2 + (0.6 * 0.5) * 0.2 + (0.5 * 0.5) * 0.2;
        assert!((breakdown.score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_validate_rejects_out_of_range_sensitivity() {
        let tables = ScoringTables::default().with_profile(
            VenueCategory::Park,
            CategoryProfile {
                base_weight: 0.8,
                crowd_sensitivity: 1.5,
                time_sensitivity: 0.8,
                weather_sensitivity: 0.9,
            },
        );
        let err = tables.validate(&[VenueCategory::Park]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
    }

    #[test]
    fn test_validate_rejects_unprofiled_category() {
        let tables = ScoringTables::empty();
        let err = tables.validate(&[VenueCategory::Park]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
    }

    #[test]
    fn test_validate_accepts_fallback_for_unprofiled() {
        let tables = ScoringTables::empty().with_fallback_profile(CategoryProfile {
            base_weight: 0.5,
            crowd_sensitivity: 0.5,
            time_sensitivity: 0.5,
            weather_sensitivity: 0.5,
        });
        assert!(tables.validate(&[VenueCategory::Park]).is_ok());
    }

    #[test]
    fn test_validate_stock_tables() {
        assert!(ScoringTables::default().validate(&VenueCategory::ALL).is_ok());
    }
}
