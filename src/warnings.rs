//! Regional threshold warnings over scored venues.

use std::collections::BTreeMap;

use crate::models::{RegionWarning, ScoredVenue, WarningKind, WarningSeverity};
use crate::scoring::CROWD_DENSITY_SCALE;

/// Threshold warnings over one run's scored records, grouped by region
/// (rows with an empty region group under the empty string).
///
/// Both rules compare strictly, so a mean landing exactly on a bound fires
/// nothing:
/// - mean emotion score `< -threshold`: `NegativeEmotion`, severity high
/// - mean crowd density `> threshold * 10000`: `HighCrowdDensity`, severity
///   medium
///
/// Regions are emitted in sorted order, the emotion rule before the density
/// rule within a region.
pub fn generate_warnings(venues: &[ScoredVenue], threshold: f64) -> Vec<RegionWarning> {
    let mut by_region: BTreeMap<&str, Vec<&ScoredVenue>> = BTreeMap::new();
    for venue in venues {
        by_region.entry(venue.region.as_str()).or_default().push(venue);
    }

    let mut warnings = Vec::new();
    for (region, entries) in by_region {
        let n = entries.len() as f64;
        let mean_score = entries.iter().map(|v| v.emotion_score).sum::<f64>() / n;
        let mean_density = entries.iter().map(|v| v.crowd_density).sum::<f64>() / n;

        if mean_score < -threshold {
            warnings.push(RegionWarning {
                region: region.to_string(),
                kind: WarningKind::NegativeEmotion,
                severity: WarningSeverity::High,
                message: format!(
                    "Region {} shows a pronounced negative emotion trend (mean score {:.2})",
                    region, mean_score
                ),
            });
        }

        if mean_density > threshold * CROWD_DENSITY_SCALE {
            warnings.push(RegionWarning {
                region: region.to_string(),
                kind: WarningKind::HighCrowdDensity,
                severity: WarningSeverity::Medium,
                message: format!(
                    "Region {} has elevated crowd density (mean {:.0})",
                    region, mean_density
                ),
            });
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TimeBucket, VenueCategory};

    fn scored(region: &str, emotion_score: f64, crowd_density: f64) -> ScoredVenue {
        ScoredVenue {
            name: "venue".to_string(),
            category: VenueCategory::Park,
            region: region.to_string(),
            longitude: 118.0,
            latitude: 36.8,
            address: String::new(),
            emotion_score,
            time_bucket: TimeBucket::Morning,
            weather: None,
            temperature_c: None,
            crowd_density,
            is_weekend: false,
        }
    }

    #[test]
    fn test_empty_input_yields_no_warnings() {
        assert!(generate_warnings(&[], 0.8).is_empty());
    }

    #[test]
    fn test_calm_region_yields_no_warnings() {
        let venues = vec![scored("Zhangdian", 0.67, 450.0), scored("Zhangdian", 0.72, 600.0)];
        assert!(generate_warnings(&venues, 0.8).is_empty());
    }

    #[test]
    fn test_negative_emotion_warning() {
        // mean (-0.95 + -0.85) / 2 = -0.90 < -0.8
        let venues = vec![scored("Boshan", -0.95, 100.0), scored("Boshan", -0.85, 100.0)];
        let warnings = generate_warnings(&venues, 0.8);

        assert_eq!(warnings.len(), 1);
        let warning = &warnings[0];
        assert_eq!(warning.region, "Boshan");
        assert_eq!(warning.kind, WarningKind::NegativeEmotion);
        assert_eq!(warning.severity, WarningSeverity::High);
        assert!(warning.message.contains("Boshan"));
    }

    #[test]
    fn test_high_crowd_density_warning() {
        // mean density 9000 > 0.8 * 10000
        let venues = vec![scored("Linzi", 0.5, 10_000.0), scored("Linzi", 0.4, 8_000.0)];
        let warnings = generate_warnings(&venues, 0.8);

        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::HighCrowdDensity);
        assert_eq!(warnings[0].severity, WarningSeverity::Medium);
    }

    #[test]
    fn test_exact_bounds_do_not_fire() {
        let venues = vec![scored("Zhoucun", -0.8, 8_000.0)];
        assert!(generate_warnings(&venues, 0.8).is_empty());
    }

    #[test]
    fn test_both_rules_fire_for_one_region() {
        let venues = vec![scored("Huantai", -0.9, 9_500.0)];
        let warnings = generate_warnings(&venues, 0.8);

        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].kind, WarningKind::NegativeEmotion);
        assert_eq!(warnings[1].kind, WarningKind::HighCrowdDensity);
    }

    #[test]
    fn test_regions_emitted_in_sorted_order() {
        let venues = vec![
            scored("Zichuan", -0.9, 100.0),
            scored("Boshan", -0.9, 100.0),
            scored("Linzi", -0.9, 100.0),
        ];
        let warnings = generate_warnings(&venues, 0.8);
        let regions: Vec<&str> = warnings.iter().map(|w| w.region.as_str()).collect();
        assert_eq!(regions, vec!["Boshan", "Linzi", "Zichuan"]);
    }

    #[test]
    fn test_threshold_is_configurable() {
        let venues = vec![scored("Gaoqing", -0.5, 4_500.0)];

        assert!(generate_warnings(&venues, 0.8).is_empty());

        let warnings = generate_warnings(&venues, 0.4);
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_regions_aggregate_independently() {
        let venues = vec![
            scored("Boshan", -0.95, 100.0),
            scored("Boshan", -0.85, 100.0),
            scored("Zhangdian", 0.7, 400.0),
        ];
        let warnings = generate_warnings(&venues, 0.8);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].region, "Boshan");
    }
}
