//! Routes API adapter for distance/duration matrices.

use std::time::Duration;

use chrono::{DateTime, Local, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::coordinate::Coordinate;
use crate::error::OracleError;
use crate::traits::{DistanceOracle, ElementOutcome, OracleElement, OracleQuery};

pub const DEFAULT_ROUTES_API_URL: &str =
    "https://routes.googleapis.com/distanceMatrix/v2:computeRouteMatrix";

const FIELD_MASK: &str = "originIndex,destinationIndex,distanceMeters,duration,status,condition";

#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ROUTES_API_URL.to_string(),
            api_key: String::new(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoutesApiClient {
    config: OracleConfig,
    client: reqwest::blocking::Client,
}

impl RoutesApiClient {
    pub fn new(config: OracleConfig) -> Result<Self, OracleError> {
        if config.api_key.is_empty() {
            warn!("no Routes API key configured; oracle calls will fail and fall back");
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }
}

impl DistanceOracle for RoutesApiClient {
    fn route_matrix(&self, query: &OracleQuery<'_>) -> Result<Vec<OracleElement>, OracleError> {
        if self.config.api_key.is_empty() {
            return Err(OracleError::MissingApiKey);
        }

        debug!(
            origins = query.origins.len(),
            destinations = query.destinations.len(),
            traffic = query.use_traffic,
            "calling Routes API"
        );

        let body = self
            .client
            .post(&self.config.base_url)
            .header("X-Goog-Api-Key", &self.config.api_key)
            .header("X-Goog-FieldMask", FIELD_MASK)
            .json(&MatrixRequestBody::from_query(query))
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.text())?;

        parse_elements(&body)
    }
}

/// Decode a compute-route-matrix response body.
pub fn parse_elements(body: &str) -> Result<Vec<OracleElement>, OracleError> {
    let elements: Vec<RouteMatrixElement> = serde_json::from_str(body)?;
    Ok(elements.into_iter().map(RouteMatrixElement::into_element).collect())
}

/// Parse a protobuf duration string such as `"123s"` or `"12.5s"`.
pub fn parse_duration(text: &str) -> Option<i64> {
    let seconds: f64 = text.strip_suffix('s')?.parse().ok()?;
    seconds.is_finite().then(|| seconds.round() as i64)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MatrixRequestBody {
    origins: Vec<MatrixWaypoint>,
    destinations: Vec<MatrixWaypoint>,
    travel_mode: &'static str,
    routing_preference: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    departure_time: Option<String>,
}

impl MatrixRequestBody {
    fn from_query(query: &OracleQuery<'_>) -> Self {
        let waypoints = |points: &[Coordinate]| points.iter().copied().map(MatrixWaypoint::at).collect();
        let (routing_preference, departure_time) = if query.use_traffic {
            ("TRAFFIC_AWARE", query.departure_time.map(rfc3339_utc))
        } else {
            ("TRAFFIC_UNAWARE", None)
        };

        Self {
            origins: waypoints(query.origins),
            destinations: waypoints(query.destinations),
            travel_mode: "DRIVE",
            routing_preference,
            departure_time,
        }
    }
}

fn rfc3339_utc(time: DateTime<Local>) -> String {
    time.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Debug, Serialize)]
struct MatrixWaypoint {
    waypoint: Waypoint,
}

#[derive(Debug, Serialize)]
struct Waypoint {
    location: Location,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Location {
    lat_lng: LatLng,
}

#[derive(Debug, Serialize)]
struct LatLng {
    latitude: f64,
    longitude: f64,
}

impl MatrixWaypoint {
    fn at(point: Coordinate) -> Self {
        Self {
            waypoint: Waypoint {
                location: Location {
                    lat_lng: LatLng {
                        latitude: point.lat(),
                        longitude: point.lng(),
                    },
                },
            },
        }
    }
}

// Zero-valued fields are omitted on the wire, hence the defaults.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouteMatrixElement {
    #[serde(default)]
    origin_index: usize,
    #[serde(default)]
    destination_index: usize,
    distance_meters: Option<i64>,
    duration: Option<String>,
    status: Option<RpcStatus>,
    condition: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RpcStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

impl RouteMatrixElement {
    fn into_element(self) -> OracleElement {
        let outcome = self.outcome();
        OracleElement {
            origin_index: self.origin_index,
            destination_index: self.destination_index,
            outcome,
        }
    }

    fn outcome(&self) -> ElementOutcome {
        if let Some(status) = self.status.as_ref().filter(|status| status.code != 0) {
            return ElementOutcome::Failed(format!("status {}: {}", status.code, status.message));
        }
        if self.condition.as_deref() == Some("ROUTE_NOT_FOUND") {
            return ElementOutcome::Failed("ROUTE_NOT_FOUND".to_string());
        }
        // An existing route between identical points may omit the distance.
        let distance_meters = self.distance_meters.unwrap_or(0);
        match self.duration.as_deref().and_then(parse_duration) {
            Some(duration_seconds) => ElementOutcome::Route {
                distance_meters,
                duration_seconds,
            },
            None => ElementOutcome::Failed("missing duration".to_string()),
        }
    }
}
