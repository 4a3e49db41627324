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

//! Cron-triggered Open-Meteo to OTLP telemetry adapter
//!
//! ## Features
//!
//! `meteo_exporter` is woken up by a scheduler with an HTTP `POST /`. On each trigger it reads the
//! tenant's configuration and list of monitored locations from a knowledge store, fetches current
//! conditions for those locations from [Open-Meteo], and exports them as OTLP gauges to an ingestion
//! endpoint. Its own activity during the run is shipped back to the tenant as OTLP logs when the
//! tenant's config asks for it.
//!
//! The following gauges are exported for every location, tagged with `location.name`,
//! `location.latitude`, `location.longitude`, `location.elevation` and `telemetry.sdk.name`.
//!
//! * `apparent_temperature` - Celsius
//! * `cloud_cover` - %
//! * `is_day`
//! * `precipitation` - mm
//! * `pressure_msl` - hPa
//! * `rain` - mm
//! * `relative_humidity_2m` - %
//! * `showers` - mm
//! * `snowfall` - cm
//! * `surface_pressure` - hPa
//! * `temperature_2m` - Celsius
//! * `weather_code` - WMO code
//! * `wind_direction_10m` - degrees
//! * `wind_gusts_10m` - km/h
//! * `wind_speed_10m` - km/h
//!
//! [Open-Meteo]: https://open-meteo.com/
//!
//! ## Build
//!
//! `meteo_exporter` is a Rust program and must be built from source using a [Rust toolchain](https://rustup.rs/).
//!
//! ```text
//! git clone git@github.com:56quarters/meteo_exporter.git && cd meteo_exporter
//! cargo build --release
//! ```
//!
//! ## Usage
//!
//! ### Run
//!
//! The knowledge store and the ingestion endpoint must be provided, either as flags or as the
//! `METEO_KNOWLEDGE_STORE_URL` and `METEO_INGEST_URL` environment variables.
//!
//! ```text
//! ./meteo_exporter --knowledge-store-url http://knowledge-store:8080/ --ingest-url http://collector:4318/
//! ```
//!
//! ### Trigger
//!
//! Each `POST` to `/` runs the pipeline once and answers with `ok` or `error`. Tenant identity
//! is taken from the request headers (`layer-id`, `layer-type`, `appd-cpty`, `appd-cpid` and
//! friends) and forwarded to the knowledge store and the ingestion endpoint.
//!
//! ```text
//! curl -sS -X POST -H 'layer-id: my-tenant' -H 'layer-type: TENANT' http://localhost:8080/
//! ```
//!
//! ### Tenant logs
//!
//! The `logLevel` field of the tenant's config object controls which records of a run are
//! exported back. `INFO` exports records at `INFO` and above, `DEBUG` exports everything, and
//! `OFF` (or a missing config) exports nothing.
//!
//! ### Prometheus
//!
//! Counters for runs and exports of the process itself are exposed at `/metrics`.
//!

pub mod client;
pub mod context;
pub mod export;
pub mod headers;
pub mod http;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod stats;
pub mod weather;
