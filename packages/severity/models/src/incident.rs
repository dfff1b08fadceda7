//! Incoming civic incident reports.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::LatLon;

/// Field names accepted for latitude, in lookup order.
pub const LAT_ALIASES: [&str; 3] = ["lat", "latitude", "y"];

/// Field names accepted for longitude, in lookup order.
pub const LON_ALIASES: [&str; 3] = ["lon", "longitude", "x"];

/// An incident report as submitted by the caller.
///
/// Kept as the original JSON object so that every field, including ones
/// scoring never looks at, is echoed back unchanged in the result.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Incident(Map<String, Value>);

impl Incident {
    /// Creates an incident with an id and a `lat`/`lon` pair.
    #[must_use]
    pub fn new(id: impl Into<Value>, lat: f64, lon: f64) -> Self {
        Self::default()
            .with_field("id", id)
            .with_field("lat", lat)
            .with_field("lon", lon)
    }

    /// Sets a field, replacing any previous value.
    #[must_use]
    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    #[must_use]
    pub const fn from_map(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    #[must_use]
    pub fn id(&self) -> Option<&Value> {
        self.0.get("id")
    }

    /// Free-text issue type. Not used by scoring.
    #[must_use]
    pub fn issue_type(&self) -> Option<&str> {
        self.0.get("issue_type").and_then(Value::as_str)
    }

    /// Extracts the incident location.
    ///
    /// Each axis is read from the first alias that is present and not
    /// `null`. Numbers and numeric strings are accepted. Returns `None`
    /// when either axis is missing, unparseable or out of range; later
    /// aliases are not consulted once an earlier one is present.
    #[must_use]
    pub fn coordinates(&self) -> Option<LatLon> {
        let lat = parse_coordinate(self.first_present(&LAT_ALIASES)?)?;
        let lon = parse_coordinate(self.first_present(&LON_ALIASES)?)?;
        let location = LatLon::new(lat, lon);
        location.is_valid().then_some(location)
    }

    fn first_present(&self, aliases: &[&str]) -> Option<&Value> {
        aliases
            .iter()
            .find_map(|key| self.0.get(*key).filter(|v| !v.is_null()))
    }
}

impl From<Map<String, Value>> for Incident {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

fn parse_coordinate(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    parsed.is_finite().then_some(parsed)
}
