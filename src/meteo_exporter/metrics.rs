// meteo_exporter - Open-Meteo to OTLP telemetry adapter
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::model::{Current, Location, WeatherReading};
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::Arc;

pub const ATTR_SERVICE: &str = "telemetry.sdk.name";
pub const ATTR_LOCATION_NAME: &str = "location.name";
pub const ATTR_LOCATION_LATITUDE: &str = "location.latitude";
pub const ATTR_LOCATION_LONGITUDE: &str = "location.longitude";
pub const ATTR_LOCATION_ELEVATION: &str = "location.elevation";
pub const ATTR_SOLUTION_NAME: &str = "meteodata.name";

const SOLUTION_NAME: &str = "meteodata";
const WINDOW_SECS: i64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("{locations} locations but {readings} weather readings")]
    Misaligned { locations: usize, readings: usize },
    #[error("invalid reading timestamp {0}: {1}")]
    Timestamp(String, #[source] chrono::ParseError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Double(f64),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{}", s),
            Self::Double(d) => write!(f, "{}", d),
        }
    }
}

/// Ordered set of identity tags attached to every metric or log in a scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resource {
    attributes: Vec<(String, AttributeValue)>,
}

impl Resource {
    pub fn with_string<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.attributes.push((key.into(), AttributeValue::String(value.into())));
        self
    }

    pub fn with_double<K: Into<String>>(mut self, key: K, value: f64) -> Self {
        self.attributes.push((key.into(), AttributeValue::Double(value)));
        self
    }

    /// Resource for logs exported on behalf of the tenant.
    pub fn for_logs(service_name: &str) -> Self {
        Resource::default()
            .with_string(ATTR_SOLUTION_NAME, SOLUTION_NAME)
            .with_string(ATTR_SERVICE, service_name)
    }

    /// Resource for all metrics of a single location.
    pub fn for_location(location: &Location, elevation: f64, service_name: &str) -> Self {
        Resource::default()
            .with_string(ATTR_LOCATION_NAME, location.name.as_str())
            .with_double(ATTR_LOCATION_LATITUDE, location.latitude)
            .with_double(ATTR_LOCATION_LONGITUDE, location.longitude)
            .with_double(ATTR_LOCATION_ELEVATION, elevation)
            .with_string(ATTR_SERVICE, service_name)
    }

    pub fn attributes(&self) -> &[(String, AttributeValue)] {
        &self.attributes
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.attributes.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", k, v)?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
        }
    }
}

/// A single gauge value for one location over a one minute window.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    pub resource: Arc<Resource>,
    pub name: &'static str,
    pub unit: &'static str,
    pub value: MetricValue,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

struct Measurement {
    name: &'static str,
    unit: &'static str,
    read: fn(&Current) -> MetricValue,
}

const MEASUREMENTS: [Measurement; 15] = [
    Measurement {
        name: "apparent_temperature",
        unit: "Celsius",
        read: |c| MetricValue::Float(c.apparent_temperature),
    },
    Measurement {
        name: "cloud_cover",
        unit: "%",
        read: |c| MetricValue::Int(c.cloud_cover),
    },
    Measurement {
        name: "is_day",
        unit: "",
        read: |c| MetricValue::Int(c.is_day),
    },
    Measurement {
        name: "precipitation",
        unit: "mm",
        read: |c| MetricValue::Float(c.precipitation),
    },
    Measurement {
        name: "pressure_msl",
        unit: "hPa",
        read: |c| MetricValue::Float(c.pressure_msl),
    },
    Measurement {
        name: "rain",
        unit: "mm",
        read: |c| MetricValue::Float(c.rain),
    },
    Measurement {
        name: "relative_humidity_2m",
        unit: "%",
        read: |c| MetricValue::Int(c.relative_humidity_2m),
    },
    Measurement {
        name: "showers",
        unit: "mm",
        read: |c| MetricValue::Float(c.showers),
    },
    Measurement {
        name: "snowfall",
        unit: "cm",
        read: |c| MetricValue::Float(c.snowfall),
    },
    Measurement {
        name: "surface_pressure",
        unit: "hPa",
        read: |c| MetricValue::Float(c.surface_pressure),
    },
    Measurement {
        name: "temperature_2m",
        unit: "Celsius",
        read: |c| MetricValue::Float(c.temperature_2m),
    },
    Measurement {
        name: "weather_code",
        unit: "WMO code",
        read: |c| MetricValue::Int(c.weather_code),
    },
    Measurement {
        name: "wind_direction_10m",
        unit: "degrees",
        read: |c| MetricValue::Float(c.wind_direction_10m),
    },
    Measurement {
        name: "wind_gusts_10m",
        unit: "km/h",
        read: |c| MetricValue::Float(c.wind_gusts_10m),
    },
    Measurement {
        name: "wind_speed_10m",
        unit: "km/h",
        read: |c| MetricValue::Float(c.wind_speed_10m),
    },
];

/// Parse the provider's `YYYY-MM-DDTHH:MM` timestamp as a UTC instant.
///
/// The provider omits seconds and offset, so `:00Z` is appended before parsing.
pub fn observed_at(time: &str) -> Result<DateTime<Utc>, ProjectionError> {
    let stamp = format!("{}:00Z", time);
    DateTime::parse_from_rfc3339(&stamp)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ProjectionError::Timestamp(stamp, e))
}

/// Convert index aligned locations and readings into metric points.
///
/// Every location yields one point per measurement, all sharing a resource descriptor
/// and a window ending at the reading's timestamp. The inputs must be the same length.
pub fn project(
    locations: &[Location],
    readings: &[WeatherReading],
    service_name: &str,
) -> Result<Vec<MetricPoint>, ProjectionError> {
    if locations.len() != readings.len() {
        return Err(ProjectionError::Misaligned {
            locations: locations.len(),
            readings: readings.len(),
        });
    }

    let mut points = Vec::with_capacity(locations.len() * MEASUREMENTS.len());
    for (location, reading) in locations.iter().zip(readings) {
        let resource = Arc::new(Resource::for_location(location, reading.elevation, service_name));
        let end = observed_at(&reading.current.time)?;
        let start = end - Duration::seconds(WINDOW_SECS);

        points.extend(MEASUREMENTS.iter().map(|m| MetricPoint {
            resource: resource.clone(),
            name: m.name,
            unit: m.unit,
            value: (m.read)(&reading.current),
            start,
            end,
        }));
    }

    Ok(points)
}
