use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Dubai city centre; used whenever the seed value carries no usable point.
pub const DEFAULT_COORDINATES: Coordinates = Coordinates {
    longitude: 55.2708,
    latitude: 25.2048,
};

/// Center deltas at or below this are treated as the same point.
pub const CENTER_TOLERANCE_DEG: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub longitude: f64,
    pub latitude: f64,
}

impl Coordinates {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.longitude.is_finite()
            && self.latitude.is_finite()
            && (-180.0..=180.0).contains(&self.longitude)
            && (-90.0..=90.0).contains(&self.latitude)
    }

    pub fn within(&self, other: &Coordinates, tolerance: f64) -> bool {
        (self.longitude - other.longitude).abs() <= tolerance
            && (self.latitude - other.latitude).abs() <= tolerance
    }

    pub fn as_pair(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationSource {
    Input,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedLocation {
    pub longitude: f64,
    pub latitude: f64,
    pub name: String,
    pub source: LocationSource,
}

impl ParsedLocation {
    /// Parses a caller-supplied seed value.
    ///
    /// Accepted shapes, in order: a JSON object carrying `coordinates`
    /// (`[lng, lat]`) and an optional `address`/`name`, a bare JSON
    /// `[lng, lat]` array, or `lng,lat[,name]` text. Anything else is treated
    /// as an opaque place name at [`DEFAULT_COORDINATES`].
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let parsed = parse_json(trimmed).or_else(|| parse_delimited(trimmed));
        match parsed {
            Some((coords, name)) if coords.is_valid() => Self {
                longitude: coords.longitude,
                latitude: coords.latitude,
                name: name.unwrap_or_else(|| trimmed.to_string()),
                source: LocationSource::Input,
            },
            _ => {
                debug!(input = raw, "location input has no usable coordinate; using default");
                Self {
                    longitude: DEFAULT_COORDINATES.longitude,
                    latitude: DEFAULT_COORDINATES.latitude,
                    name: raw.to_string(),
                    source: LocationSource::Fallback,
                }
            }
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.longitude, self.latitude)
    }

    pub fn is_fallback(&self) -> bool {
        self.source == LocationSource::Fallback
    }
}

fn parse_json(input: &str) -> Option<(Coordinates, Option<String>)> {
    if !input.starts_with('{') && !input.starts_with('[') {
        return None;
    }
    let value: Value = serde_json::from_str(input).ok()?;
    match value {
        Value::Array(items) => Some((pair_from_values(&items)?, None)),
        Value::Object(map) => {
            let coords = match map.get("coordinates") {
                Some(Value::Array(items)) => pair_from_values(items)?,
                _ => {
                    let lng = map.get("longitude").or_else(|| map.get("lng"))?.as_f64()?;
                    let lat = map.get("latitude").or_else(|| map.get("lat"))?.as_f64()?;
                    Coordinates::new(lng, lat)
                }
            };
            let name = ["address", "formattedAddress", "name"]
                .iter()
                .filter_map(|key| map.get(*key).and_then(Value::as_str))
                .map(str::trim)
                .find(|v| !v.is_empty())
                .map(str::to_string);
            Some((coords, name))
        }
        _ => None,
    }
}

fn pair_from_values(items: &[Value]) -> Option<Coordinates> {
    match items {
        [lng, lat, ..] => Some(Coordinates::new(lng.as_f64()?, lat.as_f64()?)),
        _ => None,
    }
}

fn parse_delimited(input: &str) -> Option<(Coordinates, Option<String>)> {
    let mut parts = input.splitn(3, ',');
    let lng = parts.next()?.trim().parse::<f64>().ok()?;
    let lat = parts.next()?.trim().parse::<f64>().ok()?;
    let name = parts
        .next()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);
    Some((Coordinates::new(lng, lat), name))
}

/// The single authoritative pin position for one mounted picker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveLocation {
    pub longitude: f64,
    pub latitude: f64,
    pub zoom_level: f64,
}

impl ActiveLocation {
    pub fn new(coords: Coordinates, zoom_level: f64) -> Self {
        Self {
            longitude: coords.longitude,
            latitude: coords.latitude,
            zoom_level,
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.longitude, self.latitude)
    }
}

/// Address emitted to the host once a lookup settles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLocation {
    pub address: String,
    pub coordinates: [f64; 2],
    pub formatted_address: String,
}

impl ResolvedLocation {
    pub fn from_place_name(coords: Coordinates, place_name: &str) -> Self {
        Self {
            address: place_name.to_string(),
            coordinates: coords.as_pair(),
            formatted_address: place_name.to_string(),
        }
    }
}
