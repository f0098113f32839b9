//! Score projection over future days and time buckets.
//!
//! The forecaster owns one regression forest and retrains it from scratch on
//! every `predict` call from the current run's samples; nothing is carried
//! over between runs.

use chrono::{Duration, NaiveDate};

use crate::errors::EngineError;
use crate::forest::{ForestConfig, RegressionForest};
use crate::helpers::round2;
use crate::models::{DayType, ForecastEntry, ForecastSample, TimeBucket};
use crate::scoring::time_weight;

/// Crowd-density feature used for future cells. A fixed placeholder: future
/// densities are not modeled, so every cell gets this constant rather than a
/// projected value.
const PREDICT_CROWD_DENSITY: f64 = 0.5;

/// Weather-score feature used for future cells; same placeholder scheme.
const PREDICT_WEATHER_SCORE: f64 = 0.6;

/// Reported confidence. A constant placeholder, not a derived interval.
const FORECAST_CONFIDENCE: f64 = 0.5;

/// Retrain-per-predict forecaster over a seeded regression forest.
pub struct Forecaster {
    model: RegressionForest,
}

impl Forecaster {
    pub fn new() -> Self {
        Self::with_config(ForestConfig::default())
    }

    pub fn with_config(config: ForestConfig) -> Self {
        Self {
            model: RegressionForest::new(config),
        }
    }

    /// Fit the model on `samples` and project scores for every (day, bucket)
    /// cell over `future_days` days starting at `from` (offset 0 = `from`
    /// itself), buckets in morning/noon/afternoon/evening order.
    ///
    /// Future cells vary only in `time_weight` and the weekend flag; crowd
    /// and weather features are the fixed placeholders above. Fails with
    /// `EmptyTrainingSet` when `samples` is empty.
    pub fn predict(
        &mut self,
        samples: &[ForecastSample],
        from: NaiveDate,
        future_days: u32,
    ) -> Result<Vec<ForecastEntry>, EngineError> {
        if samples.is_empty() {
            return Err(EngineError::EmptyTrainingSet);
        }

        let features: Vec<Vec<f64>> = samples.iter().map(|s| s.features().to_vec()).collect();
        let labels: Vec<f64> = samples.iter().map(|s| s.label).collect();
        self.model.fit(&features, &labels);

        let mut entries = Vec::with_capacity(future_days as usize * TimeBucket::ALL.len());
        for offset in 0..future_days {
            let date = from + Duration::days(i64::from(offset));
            let day_type = DayType::from_date(date);
            let weekend_flag = if day_type == DayType::Weekend { 1.0 } else { 0.0 };

            for bucket in TimeBucket::ALL {
                let cell = [
                    PREDICT_CROWD_DENSITY,
                    time_weight(day_type, bucket),
                    PREDICT_WEATHER_SCORE,
                    weekend_flag,
                ];
                entries.push(ForecastEntry {
                    date,
                    time_bucket: bucket,
                    predicted_emotion: round2(self.model.predict_one(&cell)),
                    confidence: FORECAST_CONFIDENCE,
                });
            }
        }
        Ok(entries)
    }
}

impl Default for Forecaster {
    fn default() -> Self {
        Self::new()
    }
}
