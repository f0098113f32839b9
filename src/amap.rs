//! Amap (Gaode) web service client.
//!
//! Fetches POI pages and city weather from the Amap v3 REST API.
//! See: https://lbs.amap.com/api/webservice/guide/api/search

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::Instant;

use crate::errors::EngineError;
use crate::gateway::VenueGateway;
use crate::helpers::parse_location;
use crate::models::{CurrentWeather, DailyCast, Venue, VenueCategory, WeatherReport};

const AMAP_API_URL: &str = "https://restapi.amap.com/v3";

/// POIs per page (`offset` parameter). An empty page ends pagination.
const PAGE_SIZE: u32 = 25;

/// Minimum spacing between consecutive outgoing requests.
const DEFAULT_MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(500);

/// Per-request timeout so a hung call cannot stall a whole run.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Temperature assumed when a live payload omits or garbles the field.
const DEFAULT_LIVE_TEMPERATURE_C: f64 = 23.0;

/// Amap POI classification code for a category.
fn type_code(category: VenueCategory) -> &'static str {
    match category {
        VenueCategory::Mall => "060100",
        VenueCategory::Park => "110100",
        VenueCategory::Hospital => "090100",
        VenueCategory::School => "141200",
        VenueCategory::Attraction => "110200",
        VenueCategory::SportsVenue => "080100",
        VenueCategory::CulturalVenue => "140000",
        VenueCategory::Dining => "050000",
    }
}

/// Minimum-interval pacing for outgoing requests.
///
/// Each caller reserves the next free send slot and sleeps until it arrives.
/// Slots advance by the configured interval; clones share one slot sequence.
#[derive(Debug, Clone)]
struct Pacer {
    min_interval: Duration,
    next_slot: Arc<Mutex<Option<Instant>>>,
}

impl Pacer {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Arc::new(Mutex::new(None)),
        }
    }

    async fn wait_turn(&self) {
        let now = Instant::now();
        // The lock guard must not be held across the sleep.
        let slot = {
            let mut next = self.next_slot.lock().unwrap();
            let slot = match *next {
                Some(at) if at > now => at,
                _ => now,
            };
            *next = Some(slot + self.min_interval);
            slot
        };
        if slot > now {
            tokio::time::sleep_until(slot).await;
        }
    }
}

/// Client for the Amap place-search and weather endpoints.
#[derive(Debug, Clone)]
pub struct AmapClient {
    client: reqwest::Client,
    key: String,
    base_url: String,
    pacer: Pacer,
}

impl AmapClient {
    pub fn new(api_key: &str) -> Self {
        Self::with_settings(
            api_key,
            AMAP_API_URL,
            DEFAULT_MIN_REQUEST_INTERVAL,
            DEFAULT_REQUEST_TIMEOUT,
        )
    }

    /// Client against a non-default base URL with the default pacing and
    /// timeout. Tests point this at a local mock server.
    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        Self::with_settings(
            api_key,
            base_url,
            DEFAULT_MIN_REQUEST_INTERVAL,
            DEFAULT_REQUEST_TIMEOUT,
        )
    }

    /// Fully parameterized constructor: key, base URL, minimum spacing
    /// between requests, per-request timeout.
    pub fn with_settings(
        api_key: &str,
        base_url: &str,
        min_request_interval: Duration,
        request_timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            pacer: Pacer::new(min_request_interval),
        }
    }
}

#[async_trait]
impl VenueGateway for AmapClient {
    async fn fetch_venue_page(
        &self,
        city: &str,
        category: VenueCategory,
        page: u32,
    ) -> Result<Vec<Venue>, EngineError> {
        self.pacer.wait_turn().await;

        let url = format!("{}/place/text", self.base_url);
        let page_param = page.to_string();
        let offset_param = PAGE_SIZE.to_string();
        let params = [
            ("key", self.key.as_str()),
            ("types", type_code(category)),
            ("city", city),
            ("citylimit", "true"),
            ("offset", offset_param.as_str()),
            ("page", page_param.as_str()),
            ("extensions", "all"),
        ];

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| EngineError::GatewayUnavailable(format!("Amap place request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(EngineError::GatewayUnavailable(format!(
                "Amap returned HTTP {}",
                response.status()
            )));
        }

        let body: PlaceResponse = response
            .json()
            .await
            .map_err(|e| EngineError::MalformedResponse(format!("Amap place payload: {}", e)))?;

        if body.status != "1" {
            return Err(EngineError::GatewayUnavailable(format!(
                "Amap rejected place query: {}",
                body.info
            )));
        }

        Ok(collect_venues(body.pois, category))
    }

    async fn fetch_weather(&self, city: &str) -> Result<WeatherReport, EngineError> {
        self.pacer.wait_turn().await;

        let url = format!("{}/weather/weatherInfo", self.base_url);
        let params = [
            ("key", self.key.as_str()),
            ("city", city),
            ("extensions", "all"),
        ];

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| EngineError::GatewayUnavailable(format!("Amap weather request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(EngineError::GatewayUnavailable(format!(
                "Amap returned HTTP {}",
                response.status()
            )));
        }

        let body: WeatherResponse = response
            .json()
            .await
            .map_err(|e| EngineError::MalformedResponse(format!("Amap weather payload: {}", e)))?;

        if body.status != "1" {
            return Err(EngineError::GatewayUnavailable(format!(
                "Amap rejected weather query: {}",
                body.info
            )));
        }

        Ok(build_report(body))
    }
}

// --- Amap JSON response types ---

#[derive(Debug, Deserialize)]
struct PlaceResponse {
    status: String,
    #[serde(default)]
    info: String,
    #[serde(default)]
    pois: Vec<PlacePoi>,
}

#[derive(Debug, Deserialize)]
struct PlacePoi {
    #[serde(default)]
    name: String,
    /// `"lng,lat"`.
    #[serde(default)]
    location: String,
    #[serde(default)]
    address: String,
    /// Administrative district name.
    #[serde(default)]
    adname: String,
    #[serde(default)]
    biz_ext: Option<PoiBizExt>,
}

#[derive(Debug, Deserialize)]
struct PoiBizExt {
    /// The API serializes an absent rating as `[]` instead of omitting the
    /// field, so this stays an untyped value until extraction.
    #[serde(default)]
    rating: Option<serde_json::Value>,
}

impl PlacePoi {
    /// Provider rating as a number; absent, empty, or non-numeric payloads
    /// yield `None`.
    fn rating(&self) -> Option<f64> {
        let raw = self.biz_ext.as_ref()?.rating.as_ref()?;
        let text = raw.as_str()?.trim();
        if text.is_empty() {
            return None;
        }
        text.parse().ok()
    }
}

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    status: String,
    #[serde(default)]
    info: String,
    #[serde(default)]
    lives: Vec<LiveWeather>,
    #[serde(default)]
    forecasts: Vec<CityForecast>,
}

#[derive(Debug, Deserialize)]
struct LiveWeather {
    #[serde(default)]
    weather: String,
    #[serde(default)]
    temperature: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CityForecast {
    #[serde(default)]
    casts: Vec<ForecastCast>,
}

#[derive(Debug, Deserialize)]
struct ForecastCast {
    #[serde(default)]
    date: String,
    #[serde(default)]
    dayweather: String,
    #[serde(default)]
    nightweather: String,
    #[serde(default)]
    daytemp: Option<String>,
    #[serde(default)]
    nighttemp: Option<String>,
}

/// Map one page of raw POIs into venues. A poi whose location does not parse
/// is dropped with a warning, not a page failure.
fn collect_venues(pois: Vec<PlacePoi>, category: VenueCategory) -> Vec<Venue> {
    let mut venues = Vec::with_capacity(pois.len());
    for poi in pois {
        let Some((longitude, latitude)) = parse_location(&poi.location) else {
            tracing::warn!(
                "Dropping poi '{}' with unparseable location '{}'",
                poi.name,
                poi.location
            );
            continue;
        };
        let rating = poi.rating();
        venues.push(Venue {
            name: poi.name,
            category,
            longitude,
            latitude,
            address: poi.address,
            rating,
            region: poi.adname,
        });
    }
    venues
}

/// Assemble the cached weather payload: the first live row becomes the
/// current observation, the first forecast block's casts the daily outlook.
/// A cast row with an unparseable date or temperature is dropped with a
/// warning.
fn build_report(body: WeatherResponse) -> WeatherReport {
    let current = body.lives.into_iter().next().map(|live| {
        let temperature_c = live
            .temperature
            .as_deref()
            .and_then(|t| t.trim().parse().ok())
            .unwrap_or(DEFAULT_LIVE_TEMPERATURE_C);
        CurrentWeather {
            condition: live.weather,
            temperature_c,
        }
    });

    let casts = body
        .forecasts
        .into_iter()
        .next()
        .map(|f| f.casts)
        .unwrap_or_default();
    let mut daily = Vec::with_capacity(casts.len());
    for cast in casts {
        let date = match chrono::NaiveDate::parse_from_str(&cast.date, "%Y-%m-%d") {
            Ok(date) => date,
            Err(_) => {
                tracing::warn!("Dropping outlook row with unparseable date '{}'", cast.date);
                continue;
            }
        };
        let day_temp = cast.daytemp.as_deref().and_then(|t| t.trim().parse().ok());
        let night_temp = cast.nighttemp.as_deref().and_then(|t| t.trim().parse().ok());
        let (Some(day_temp_c), Some(night_temp_c)) = (day_temp, night_temp) else {
            tracing::warn!("Dropping outlook row {} with unparseable temperatures", date);
            continue;
        };
        daily.push(DailyCast {
            date,
            day_condition: cast.dayweather,
            night_condition: cast.nightweather,
            day_temp_c,
            night_temp_c,
        });
    }

    WeatherReport { current, daily }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WeatherKind;

    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> AmapClient {
        AmapClient::with_settings(
            "test-key",
            base_url,
            Duration::ZERO,
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_type_code_table() {
        assert_eq!(type_code(VenueCategory::Mall), "060100");
        assert_eq!(type_code(VenueCategory::Park), "110100");
        assert_eq!(type_code(VenueCategory::Hospital), "090100");
        assert_eq!(type_code(VenueCategory::School), "141200");
        assert_eq!(type_code(VenueCategory::Attraction), "110200");
        assert_eq!(type_code(VenueCategory::SportsVenue), "080100");
        assert_eq!(type_code(VenueCategory::CulturalVenue), "140000");
        assert_eq!(type_code(VenueCategory::Dining), "050000");
    }

    #[test]
    fn test_poi_rating_variants() {
        let with_rating: PlacePoi = serde_json::from_value(json!({
            "name": "x", "location": "118,36", "biz_ext": {"rating": "4.6"}
        }))
        .unwrap();
        assert_eq!(with_rating.rating(), Some(4.6));

        // Amap sends [] for an absent rating
        let empty_array: PlacePoi = serde_json::from_value(json!({
            "name": "x", "location": "118,36", "biz_ext": {"rating": []}
        }))
        .unwrap();
        assert_eq!(empty_array.rating(), None);

        let empty_string: PlacePoi = serde_json::from_value(json!({
            "name": "x", "location": "118,36", "biz_ext": {"rating": ""}
        }))
        .unwrap();
        assert_eq!(empty_string.rating(), None);

        let no_biz_ext: PlacePoi =
            serde_json::from_value(json!({"name": "x", "location": "118,36"})).unwrap();
        assert_eq!(no_biz_ext.rating(), None);
    }

    #[tokio::test]
    async fn test_fetch_venue_page_maps_pois() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/place/text"))
            .and(query_param("key", "test-key"))
            .and(query_param("types", "110100"))
            .and(query_param("city", "Zibo"))
            .and(query_param("citylimit", "true"))
            .and(query_param("offset", "25"))
            .and(query_param("page", "1"))
            .and(query_param("extensions", "all"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "1",
                "info": "OK",
                "pois": [
                    {
                        "name": "人民公园",
                        "location": "118.055,36.813",
                        "address": "人民西路",
                        "adname": "张店区",
                        "biz_ext": {"rating": "4.5"}
                    },
                    {
                        "name": "broken",
                        "location": "not-a-location",
                        "address": "",
                        "adname": ""
                    }
                ]
            })))
            .mount(&server)
            .await;

        let client = test_client(&format!("{}/v3", server.uri()));
        let venues = client
            .fetch_venue_page("Zibo", VenueCategory::Park, 1)
            .await
            .unwrap();

        // The unparseable location is dropped, not fatal
        assert_eq!(venues.len(), 1);
        let venue = &venues[0];
        assert_eq!(venue.name, "人民公园");
        assert_eq!(venue.category, VenueCategory::Park);
        assert!((venue.longitude - 118.055).abs() < 1e-9);
        assert!((venue.latitude - 36.813).abs() < 1e-9);
        assert_eq!(venue.region, "张店区");
        assert_eq!(venue.rating, Some(4.5));
    }

    #[tokio::test]
    async fn test_fetch_venue_page_empty_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/place/text"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "1", "info": "OK", "pois": []
            })))
            .mount(&server)
            .await;

        let client = test_client(&format!("{}/v3", server.uri()));
        let venues = client
            .fetch_venue_page("Zibo", VenueCategory::Park, 3)
            .await
            .unwrap();
        assert!(venues.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_venue_page_rejected_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/place/text"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "0", "info": "INVALID_USER_KEY"
            })))
            .mount(&server)
            .await;

        let client = test_client(&format!("{}/v3", server.uri()));
        let err = client
            .fetch_venue_page("Zibo", VenueCategory::Park, 1)
            .await
            .unwrap_err();
        match err {
            EngineError::GatewayUnavailable(msg) => assert!(msg.contains("INVALID_USER_KEY")),
            other => panic!("expected GatewayUnavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_venue_page_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/place/text"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = test_client(&format!("{}/v3", server.uri()));
        let err = client
            .fetch_venue_page("Zibo", VenueCategory::Mall, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::GatewayUnavailable(_)));
    }

    #[tokio::test]
    async fn test_fetch_venue_page_undecodable_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/place/text"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = test_client(&format!("{}/v3", server.uri()));
        let err = client
            .fetch_venue_page("Zibo", VenueCategory::Mall, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_fetch_weather_full_report() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/weather/weatherInfo"))
            .and(query_param("key", "test-key"))
            .and(query_param("city", "Zibo"))
            .and(query_param("extensions", "all"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "1",
                "info": "OK",
                "lives": [
                    {"weather": "晴", "temperature": "25"}
                ],
                "forecasts": [{
                    "casts": [
                        {
                            "date": "2024-05-15",
                            "dayweather": "多云",
                            "nightweather": "晴",
                            "daytemp": "26",
                            "nighttemp": "15"
                        },
                        {
                            "date": "garbled",
                            "dayweather": "晴",
                            "nightweather": "晴",
                            "daytemp": "27",
                            "nighttemp": "16"
                        }
                    ]
                }]
            })))
            .mount(&server)
            .await;

        let client = test_client(&format!("{}/v3", server.uri()));
        let report = client.fetch_weather("Zibo").await.unwrap();

        let current = report.current.unwrap();
        assert_eq!(current.condition, "晴");
        assert_eq!(current.temperature_c, 25.0);

        // The garbled cast row is dropped
        assert_eq!(report.daily.len(), 1);
        assert_eq!(report.daily[0].day_condition, "多云");
        assert_eq!(report.daily[0].day_temp_c, 26.0);
        assert_eq!(report.daily[0].night_temp_c, 15.0);
    }

    #[tokio::test]
    async fn test_fetch_weather_missing_temperature_defaults() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/weather/weatherInfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "1",
                "lives": [{"weather": "晴"}]
            })))
            .mount(&server)
            .await;

        let client = test_client(&format!("{}/v3", server.uri()));
        let report = client.fetch_weather("Zibo").await.unwrap();
        let current = report.current.as_ref().unwrap();
        assert_eq!(current.temperature_c, DEFAULT_LIVE_TEMPERATURE_C);
        assert_eq!(
            report.observation().map(|o| o.kind),
            Some(WeatherKind::Clear)
        );
    }

    #[tokio::test]
    async fn test_fetch_weather_rejected_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/weather/weatherInfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "0", "info": "DAILY_QUERY_OVER_LIMIT"
            })))
            .mount(&server)
            .await;

        let client = test_client(&format!("{}/v3", server.uri()));
        let err = client.fetch_weather("Zibo").await.unwrap_err();
        match err {
            EngineError::GatewayUnavailable(msg) => {
                assert!(msg.contains("DAILY_QUERY_OVER_LIMIT"))
            }
            other => panic!("expected GatewayUnavailable, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacer_spaces_consecutive_calls() {
        let pacer = Pacer::new(Duration::from_millis(500));
        let start = Instant::now();

        pacer.wait_turn().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        pacer.wait_turn().await;
        assert_eq!(start.elapsed(), Duration::from_millis(500));

        pacer.wait_turn().await;
        assert_eq!(start.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacer_idle_gap_resets_spacing() {
        let pacer = Pacer::new(Duration::from_millis(500));
        pacer.wait_turn().await;

        tokio::time::advance(Duration::from_secs(5)).await;
        let before = Instant::now();
        pacer.wait_turn().await;
        // Long-idle callers go straight through
        assert_eq!(before.elapsed(), Duration::ZERO);
    }
}
