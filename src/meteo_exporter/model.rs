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

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tenant controlled verbosity of the logs exported back to the platform.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogLevel {
    #[default]
    Disabled,
    Info,
    Debug,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "OFF" | "DISABLED" => Ok(Self::Disabled),
            "INFO" => Ok(Self::Info),
            "DEBUG" => Ok(Self::Debug),
            _ => Err(format!("unknown log level {}", s)),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "DISABLED"),
            Self::Info => write!(f, "INFO"),
            Self::Debug => write!(f, "DEBUG"),
        }
    }
}

// Absent, null, and unrecognized levels all mean logging stays off.
fn lenient_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()).unwrap_or_default())
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    #[serde(alias = "name")]
    pub name: String,
    #[serde(alias = "logLevel", default, deserialize_with = "lenient_log_level")]
    pub log_level: LogLevel,
}

/// Single object lookup from the knowledge store.
#[derive(Serialize, Deserialize, Debug)]
pub struct ConfigResponse {
    #[serde(alias = "data", default)]
    pub data: Option<Config>,
    // Mirrors the wire shape, pending changes are not applied
    #[serde(alias = "patch", default)]
    pub patch: Option<Config>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Location {
    #[serde(alias = "name")]
    pub name: String,
    #[serde(alias = "latitude")]
    pub latitude: f64,
    #[serde(alias = "longitude")]
    pub longitude: f64,
}

/// Paged items lookup from the knowledge store.
#[derive(Serialize, Deserialize, Debug)]
pub struct LocationResponse {
    #[serde(alias = "items")]
    pub items: Vec<LocationItem>,
    // Mirrors the wire shape, a single page of `max` items is read
    #[serde(alias = "total", default)]
    pub total: u64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LocationItem {
    #[serde(alias = "data")]
    pub data: Location,
}

/// Current conditions reported by the weather provider for a single coordinate.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WeatherReading {
    #[serde(alias = "latitude")]
    pub latitude: f64,
    #[serde(alias = "longitude")]
    pub longitude: f64,
    #[serde(alias = "elevation")]
    pub elevation: f64,
    #[serde(alias = "current")]
    pub current: Current,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Current {
    /// Local time without seconds or offset, e.g. `2024-01-01T10:00`
    #[serde(alias = "time")]
    pub time: String,
    #[serde(alias = "temperature_2m")]
    pub temperature_2m: f64,
    #[serde(alias = "relative_humidity_2m")]
    pub relative_humidity_2m: i64,
    #[serde(alias = "apparent_temperature")]
    pub apparent_temperature: f64,
    #[serde(alias = "is_day")]
    pub is_day: i64,
    #[serde(alias = "precipitation")]
    pub precipitation: f64,
    #[serde(alias = "rain")]
    pub rain: f64,
    #[serde(alias = "showers")]
    pub showers: f64,
    #[serde(alias = "snowfall")]
    pub snowfall: f64,
    #[serde(alias = "weather_code")]
    pub weather_code: i64,
    #[serde(alias = "cloud_cover")]
    pub cloud_cover: i64,
    #[serde(alias = "pressure_msl")]
    pub pressure_msl: f64,
    #[serde(alias = "surface_pressure")]
    pub surface_pressure: f64,
    #[serde(alias = "wind_speed_10m")]
    pub wind_speed_10m: f64,
    #[serde(alias = "wind_direction_10m")]
    pub wind_direction_10m: f64,
    #[serde(alias = "wind_gusts_10m")]
    pub wind_gusts_10m: f64,
}
