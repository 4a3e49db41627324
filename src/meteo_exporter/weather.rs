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

use crate::client::{parse_base_url, with_path, ClientError, CLIENT_USER_AGENT};
use crate::model::{Location, WeatherReading};
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;

/// Fields requested for current conditions. Order is stable.
pub const CURRENT_FIELDS: [&str; 15] = [
    "temperature_2m",
    "relative_humidity_2m",
    "apparent_temperature",
    "is_day",
    "precipitation",
    "rain",
    "showers",
    "snowfall",
    "weather_code",
    "cloud_cover",
    "pressure_msl",
    "surface_pressure",
    "wind_speed_10m",
    "wind_direction_10m",
    "wind_gusts_10m",
];

#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    client: Client,
    base_url: Url,
}

impl OpenMeteoClient {
    const JSON_RESPONSE: &'static str = "application/json";

    pub fn new(client: Client, base_url: &str) -> Result<Self, ClientError> {
        Ok(OpenMeteoClient {
            client,
            base_url: parse_base_url(base_url)?,
        })
    }

    /// Fetch current conditions for every location.
    ///
    /// The result is aligned by index with `locations`. No request is made when there are
    /// no locations. A single location is answered by the provider with a single object
    /// instead of a list, which is wrapped here so callers always see a list.
    pub async fn current(&self, locations: &[Location]) -> Result<Vec<WeatherReading>, ClientError> {
        match locations.len() {
            0 => Ok(Vec::new()),
            1 => Ok(vec![self.fetch::<WeatherReading>(locations).await?]),
            _ => self.fetch::<Vec<WeatherReading>>(locations).await,
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, locations: &[Location]) -> Result<T, ClientError> {
        let url = self.forecast_url(locations);
        tracing::debug!(message = "making current conditions request", url = %url, locations = locations.len());

        let res = self.make_request(url).await?;
        Ok(res.json::<T>().await?)
    }

    async fn make_request(&self, url: Url) -> Result<Response, ClientError> {
        let res = self
            .client
            .get(url.clone())
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .header(ACCEPT, Self::JSON_RESPONSE)
            .send()
            .await?;

        let status = res.status();
        if status.is_success() {
            Ok(res)
        } else {
            Err(ClientError::Unexpected(status, url))
        }
    }

    fn forecast_url(&self, locations: &[Location]) -> Url {
        let latitudes = join(locations.iter().map(|l| l.latitude));
        let longitudes = join(locations.iter().map(|l| l.longitude));

        let mut url = with_path(&self.base_url, &["v1", "forecast"]);
        url.query_pairs_mut()
            .append_pair("latitude", &latitudes)
            .append_pair("longitude", &longitudes)
            .append_pair("current", &CURRENT_FIELDS.join(","));

        url
    }
}

fn join<I: Iterator<Item = f64>>(values: I) -> String {
    values.map(|v| v.to_string()).collect::<Vec<_>>().join(",")
}
