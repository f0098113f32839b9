//! Core domain types: venues, time context, weather, and output records.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed set of venue categories the engine scores.
///
/// Each category has a default profile and capacity in
/// `scoring::ScoringTables`; keeping the set closed turns a misconfigured
/// category into a startup validation error instead of a runtime key error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueCategory {
    Mall,
    Park,
    Hospital,
    School,
    Attraction,
    SportsVenue,
    CulturalVenue,
    Dining,
}

impl VenueCategory {
    /// Every category, in default acquisition order.
    pub const ALL: [VenueCategory; 8] = [
        VenueCategory::Mall,
        VenueCategory::Park,
        VenueCategory::Hospital,
        VenueCategory::School,
        VenueCategory::Attraction,
        VenueCategory::SportsVenue,
        VenueCategory::CulturalVenue,
        VenueCategory::Dining,
    ];

    /// Stable snake_case name, matching the serde representation.
    pub fn name(&self) -> &'static str {
        match self {
            VenueCategory::Mall => "mall",
            VenueCategory::Park => "park",
            VenueCategory::Hospital => "hospital",
            VenueCategory::School => "school",
            VenueCategory::Attraction => "attraction",
            VenueCategory::SportsVenue => "sports_venue",
            VenueCategory::CulturalVenue => "cultural_venue",
            VenueCategory::Dining => "dining",
        }
    }
}

impl std::fmt::Display for VenueCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for VenueCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VenueCategory::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| format!("Unknown venue category '{}'", s))
    }
}

/// A geotagged point of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub name: String,
    pub category: VenueCategory,
    pub longitude: f64,
    pub latitude: f64,
    pub address: String,
    /// Provider rating on a 0..5 scale, when present.
    pub rating: Option<f64>,
    /// Administrative district; the warning aggregation key. Empty when the
    /// provider omits it.
    #[serde(default)]
    pub region: String,
}

/// Morning/noon/afternoon/evening partition of the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBucket {
    Morning,
    Noon,
    Afternoon,
    Evening,
}

impl TimeBucket {
    /// Buckets in forecast emission order.
    pub const ALL: [TimeBucket; 4] = [
        TimeBucket::Morning,
        TimeBucket::Noon,
        TimeBucket::Afternoon,
        TimeBucket::Evening,
    ];

    /// Bucket for an hour of day: 06-10 morning, 11-13 noon, 14-17
    /// afternoon, everything else evening.
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            6..=10 => TimeBucket::Morning,
            11..=13 => TimeBucket::Noon,
            14..=17 => TimeBucket::Afternoon,
            _ => TimeBucket::Evening,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TimeBucket::Morning => "morning",
            TimeBucket::Noon => "noon",
            TimeBucket::Afternoon => "afternoon",
            TimeBucket::Evening => "evening",
        }
    }
}

impl std::fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Weekday/weekend split used by the time-weight table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayType {
    Weekday,
    Weekend,
}

impl DayType {
    /// Saturday and Sunday count as weekend.
    pub fn from_date(date: NaiveDate) -> Self {
        if date.weekday().num_days_from_monday() >= 5 {
            DayType::Weekend
        } else {
            DayType::Weekday
        }
    }
}

/// The local time context a run scores under.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeContext {
    pub date: NaiveDate,
    pub hour: u32,
    pub bucket: TimeBucket,
    pub day_type: DayType,
}

impl TimeContext {
    pub fn from_local(now: NaiveDateTime) -> Self {
        Self {
            date: now.date(),
            hour: now.hour(),
            bucket: TimeBucket::from_hour(now.hour()),
            day_type: DayType::from_date(now.date()),
        }
    }

    pub fn is_weekend(&self) -> bool {
        self.day_type == DayType::Weekend
    }
}

/// The fixed set of weather conditions the scoring model distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherKind {
    Clear,
    Cloudy,
    Overcast,
    Rain,
}

impl WeatherKind {
    /// Classify a free-form condition label.
    ///
    /// Amap reports conditions in Chinese ("晴", "多云", "阴", "小雨", ...);
    /// English labels classify too. Mixed labels resolve in precipitation-
    /// first order, so "晴间多云" lands on Cloudy. Unrecognized labels yield
    /// None and scoring falls back to the neutral no-observation path.
    pub fn classify(label: &str) -> Option<Self> {
        let trimmed = label.trim();
        if trimmed.is_empty() {
            return None;
        }
        let lower = trimmed.to_lowercase();
        if trimmed.contains('雨') || lower.contains("rain") {
            Some(WeatherKind::Rain)
        } else if trimmed.contains('阴') || lower.contains("overcast") {
            Some(WeatherKind::Overcast)
        } else if trimmed.contains('云') || lower.contains("cloud") {
            Some(WeatherKind::Cloudy)
        } else if trimmed.contains('晴') || lower.contains("clear") || lower.contains("sunny") {
            Some(WeatherKind::Clear)
        } else {
            None
        }
    }
}

/// Current weather as delivered by the gateway, label left raw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    /// Provider condition label (e.g. "晴").
    pub condition: String,
    pub temperature_c: f64,
}

/// One day of the provider's multi-day outlook.
///
/// Carried through the cache for downstream consumers; the estimators only
/// use the current observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCast {
    pub date: NaiveDate,
    pub day_condition: String,
    pub night_condition: String,
    pub day_temp_c: f64,
    pub night_temp_c: f64,
}

/// Weather payload for one (city, day): current observation plus outlook.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WeatherReport {
    pub current: Option<CurrentWeather>,
    #[serde(default)]
    pub daily: Vec<DailyCast>,
}

impl WeatherReport {
    /// Typed observation for scoring. None when there is no current entry or
    /// its condition label is unrecognized.
    pub fn observation(&self) -> Option<WeatherObservation> {
        let current = self.current.as_ref()?;
        let kind = WeatherKind::classify(&current.condition)?;
        Some(WeatherObservation {
            kind,
            temperature_c: current.temperature_c,
        })
    }
}

/// A classified observation the estimators consume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeatherObservation {
    pub kind: WeatherKind,
    pub temperature_c: f64,
}

/// One venue's scored record for the current run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredVenue {
    pub name: String,
    pub category: VenueCategory,
    pub region: String,
    pub longitude: f64,
    pub latitude: f64,
    pub address: String,
    /// Emotion score rounded to 2 decimals for reporting.
    pub emotion_score: f64,
    pub time_bucket: TimeBucket,
    /// Classified condition at scoring time; None when weather was missing.
    pub weather: Option<WeatherKind>,
    pub temperature_c: Option<f64>,
    pub crowd_density: f64,
    pub is_weekend: bool,
}

/// One training example for the forecaster: the run's signal features plus
/// the unrounded score label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastSample {
    /// Raw estimated density, not normalized.
    pub crowd_density: f64,
    pub time_weight: f64,
    /// Raw condition weight (0.5 when no observation); the scale the
    /// predict-time placeholder lives on.
    pub weather_score: f64,
    pub is_weekend: bool,
    /// Unrounded emotion score.
    pub label: f64,
}

impl ForecastSample {
    /// Feature vector in model order.
    pub fn features(&self) -> [f64; 4] {
        [
            self.crowd_density,
            self.time_weight,
            self.weather_score,
            if self.is_weekend { 1.0 } else { 0.0 },
        ]
    }
}

/// One forecast cell: a (date, bucket) score projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastEntry {
    pub date: NaiveDate,
    pub time_bucket: TimeBucket,
    /// Predicted score, rounded to 2 decimals.
    pub predicted_emotion: f64,
    /// Constant placeholder, not a derived interval.
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    NegativeEmotion,
    HighCrowdDensity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningSeverity {
    Medium,
    High,
}

/// A threshold warning over one region's aggregated records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionWarning {
    pub region: String,
    pub kind: WarningKind,
    pub severity: WarningSeverity,
    pub message: String,
}

/// Everything one engine run emits.
#[derive(Debug, Clone, Serialize)]
pub struct EmotionSnapshot {
    pub run_id: Uuid,
    pub city: String,
    pub generated_at: DateTime<Utc>,
    pub context: TimeContext,
    /// Observation the run scored under, when weather was available.
    pub weather: Option<WeatherObservation>,
    pub venues: Vec<ScoredVenue>,
    pub forecasts: Vec<ForecastEntry>,
    pub warnings: Vec<RegionWarning>,
}
