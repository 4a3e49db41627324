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

//! The run pipeline: configuration, locations, weather, metrics, and logs.
//!
//! Every stage reads and writes the `RunContext` of the run. Failures talking to the
//! knowledge store or the weather provider are logged and replaced by an empty or
//! default value so the run continues. Data that can't be turned into metrics aborts
//! the run with an error status. Exports are fire-and-forget: the run is finished once
//! they have been issued, and their outcome is only logged.

use crate::client::{parse_base_url, ClientError, KnowledgeStoreClient};
use crate::context::{filter_records, RunContext, Severity};
use crate::export::{ExportError, LogExporter, MetricExporter};
use crate::headers;
use crate::metrics::{self, MetricPoint, ProjectionError, Resource};
use crate::model::{Location, LogLevel, WeatherReading};
use crate::stats::RunStats;
use crate::weather::OpenMeteoClient;
use reqwest::header::HeaderMap;
use reqwest::Client;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Ok,
    Error,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of a run. Every run ends in `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Received,
    Config,
    LoggingArmed,
    Locations,
    Weather,
    MetricsBuilt,
    MetricsExported,
    LogsExported,
    Done(RunStatus),
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => write!(f, "RECEIVED"),
            Self::Config => write!(f, "CONFIG"),
            Self::LoggingArmed => write!(f, "LOGGING_ARMED"),
            Self::Locations => write!(f, "LOCATIONS"),
            Self::Weather => write!(f, "WEATHER"),
            Self::MetricsBuilt => write!(f, "METRICS_BUILT"),
            Self::MetricsExported => write!(f, "METRICS_EXPORTED"),
            Self::LogsExported => write!(f, "LOGS_EXPORTED"),
            Self::Done(status) => write!(f, "DONE({})", status),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Locations of the external services a pipeline talks to.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub knowledge_store_url: String,
    pub weather_url: String,
    pub ingest_url: String,
    pub service_name: String,
}

#[derive(Debug)]
pub struct Pipeline {
    client: Client,
    knowledge: KnowledgeStoreClient,
    weather: OpenMeteoClient,
    ingest_url: String,
    service_name: String,
    stats: RunStats,
}

impl Pipeline {
    /// Create a pipeline sharing `client` for every outbound call. All service URLs are
    /// validated here so that a misconfigured process fails at startup.
    pub fn new(client: Client, settings: &PipelineSettings, stats: RunStats) -> Result<Self, PipelineError> {
        parse_base_url(&settings.ingest_url)?;

        Ok(Pipeline {
            knowledge: KnowledgeStoreClient::new(client.clone(), &settings.knowledge_store_url)?,
            weather: OpenMeteoClient::new(client.clone(), &settings.weather_url)?,
            ingest_url: settings.ingest_url.clone(),
            service_name: settings.service_name.clone(),
            client,
            stats,
        })
    }

    /// Run the pipeline for a trigger carrying `headers`.
    pub async fn run(&self, headers: HeaderMap) -> RunStatus {
        let mut ctx = RunContext::new(headers);
        self.execute(&mut ctx).await
    }

    /// Run every stage against `ctx`, converting a fatal error into `RunStatus::Error`.
    pub async fn execute(&self, ctx: &mut RunContext) -> RunStatus {
        ctx.log(
            Severity::Info,
            "trigger received",
            &[("headers", format!("{:?}", headers::propagate(ctx.headers())))],
        );

        let status = match self.stages(ctx).await {
            Ok(()) => RunStatus::Ok,
            Err(e) => {
                ctx.log(Severity::Error, "processing error", &[("error", e.to_string())]);
                RunStatus::Error
            }
        };

        ctx.advance(RunState::Done(status));
        self.stats.run(status.as_str());
        status
    }

    async fn stages(&self, ctx: &mut RunContext) -> Result<(), PipelineError> {
        self.fetch_config(ctx).await;
        ctx.advance(RunState::Config);

        self.init_logging(ctx);
        ctx.advance(RunState::LoggingArmed);

        let locations = self.fetch_locations(ctx).await;
        ctx.advance(RunState::Locations);

        let readings = self.fetch_weather(ctx, &locations).await;
        ctx.advance(RunState::Weather);

        let points = self.prepare_metrics(ctx, &readings)?;
        ctx.advance(RunState::MetricsBuilt);

        self.export_metrics(ctx, &points)?;
        ctx.advance(RunState::MetricsExported);

        self.export_logs(ctx);
        ctx.advance(RunState::LogsExported);

        Ok(())
    }

    async fn fetch_config(&self, ctx: &mut RunContext) {
        ctx.log(Severity::Debug, "fetching config", &[]);

        let config = match self.knowledge.config(ctx.headers()).await {
            Ok(config) => {
                ctx.log(Severity::Debug, "config response", &[("config", format!("{:?}", config))]);
                config
            }
            Err(e) => {
                ctx.log(Severity::Error, "config response error", &[("error", e.to_string())]);
                None
            }
        };

        ctx.set_config(config);
    }

    fn init_logging(&self, ctx: &mut RunContext) {
        let level = ctx.log_level();
        if level == LogLevel::Disabled {
            ctx.log(Severity::Debug, "log export disabled", &[]);
            return;
        }

        match LogExporter::new(
            self.client.clone(),
            &self.ingest_url,
            headers::ingest_headers(ctx.headers()),
        ) {
            Ok(exporter) => {
                ctx.log(
                    Severity::Debug,
                    "log export enabled",
                    &[("level", level.to_string()), ("url", exporter.url().to_string())],
                );
                ctx.arm_logging(exporter, Resource::for_logs(&self.service_name));
            }
            // Unreachable while Pipeline::new validates the ingest URL, kept so a bad
            // endpoint leaves logging inert instead of failing the run
            Err(e) => {
                ctx.log(
                    Severity::Warn,
                    "unable to create log exporter, log export disabled",
                    &[("error", e.to_string())],
                );
            }
        }
    }

    async fn fetch_locations(&self, ctx: &mut RunContext) -> Vec<Location> {
        ctx.log(Severity::Debug, "fetching locations", &[]);

        let locations = match self.knowledge.locations(ctx.headers()).await {
            Ok(locations) => {
                let names = locations.iter().map(|l| l.name.as_str()).collect::<Vec<_>>().join(",");
                ctx.log(
                    Severity::Info,
                    "received locations",
                    &[("locations.count", locations.len().to_string()), ("locations", names)],
                );
                locations
            }
            Err(e) => {
                ctx.log(Severity::Error, "locations response error", &[("error", e.to_string())]);
                Vec::new()
            }
        };

        ctx.set_locations(locations.clone());
        locations
    }

    async fn fetch_weather(&self, ctx: &mut RunContext, locations: &[Location]) -> Vec<WeatherReading> {
        ctx.log(
            Severity::Debug,
            "fetching weather data",
            &[("locations.count", locations.len().to_string())],
        );

        match self.weather.current(locations).await {
            Ok(readings) => {
                ctx.log(
                    Severity::Info,
                    "received weather data",
                    &[("readings.count", readings.len().to_string())],
                );
                readings
            }
            Err(e) => {
                ctx.log(Severity::Error, "weather response error", &[("error", e.to_string())]);
                // Nothing left to project, the run finishes without metrics
                ctx.set_locations(Vec::new());
                Vec::new()
            }
        }
    }

    fn prepare_metrics(&self, ctx: &RunContext, readings: &[WeatherReading]) -> Result<Vec<MetricPoint>, PipelineError> {
        ctx.log(Severity::Debug, "generating metric data", &[]);

        let points = metrics::project(ctx.locations(), readings, &self.service_name)?;
        self.stats.points(points.len());
        Ok(points)
    }

    fn export_metrics(&self, ctx: &RunContext, points: &[MetricPoint]) -> Result<(), PipelineError> {
        // Can't fail after Pipeline::new validated the ingest URL
        let exporter = MetricExporter::new(
            self.client.clone(),
            &self.ingest_url,
            headers::ingest_headers(ctx.headers()),
        )?;

        if points.is_empty() {
            ctx.log(Severity::Debug, "no metric data to export", &[]);
            return Ok(());
        }

        ctx.log(
            Severity::Debug,
            "metrics export",
            &[("url", exporter.url().to_string()), ("metrics.count", points.len().to_string())],
        );
        log_exported(ctx, points);

        let completion = exporter.export(points);
        let stats = self.stats.clone();
        tokio::spawn(async move {
            match completion.await {
                Ok(()) => {
                    tracing::info!(message = "metric export success");
                    stats.export("metrics", true);
                }
                Err(e) => {
                    tracing::error!(message = "metric export failure", error = %e);
                    stats.export("metrics", false);
                }
            }
        });

        Ok(())
    }

    fn export_logs(&self, ctx: &RunContext) {
        let (exporter, resource) = match (ctx.log_exporter(), ctx.log_resource()) {
            (Some(exporter), Some(resource)) => (exporter, resource),
            _ => return,
        };

        ctx.log(Severity::Debug, "exporting logs", &[]);
        let records = filter_records(ctx.log_level(), ctx.logs().drain());
        if records.is_empty() {
            tracing::debug!(message = "no log records to export");
            return;
        }

        tracing::debug!(message = "logs export", url = %exporter.url(), count = records.len());
        for record in records.iter() {
            tracing::debug!(message = "exported log message", severity = %record.severity, body = %record.body);
        }

        let completion = exporter.export(resource, &records);
        let stats = self.stats.clone();
        tokio::spawn(async move {
            match completion.await {
                Ok(()) => {
                    tracing::info!(message = "logs export success");
                    stats.export("logs", true);
                }
                Err(e) => {
                    tracing::error!(message = "logs export failure", error = %e);
                    stats.export("logs", false);
                }
            }
        });
    }
}

/// Record the batch about to be exported: each resource once, followed by its metrics.
fn log_exported(ctx: &RunContext, points: &[MetricPoint]) {
    ctx.log(Severity::Debug, "exported data --- start", &[]);

    let mut current: Option<&Arc<Resource>> = None;
    for point in points {
        if !current.map(|r| Arc::ptr_eq(r, &point.resource)).unwrap_or(false) {
            ctx.log(Severity::Debug, "", &[("resource", point.resource.to_string())]);
            current = Some(&point.resource);
        }

        ctx.log(
            Severity::Debug,
            "",
            &[
                ("metric", point.name.to_owned()),
                ("unit", point.unit.to_owned()),
                ("value", point.value.to_string()),
            ],
        );
    }

    ctx.log(Severity::Debug, "exported data --- end", &[]);
}

#[cfg(test)]
mod tests {
    use super::{Pipeline, PipelineError, PipelineSettings, RunState, RunStatus};
    use crate::context::{RunContext, INFO_THRESHOLD};
    use crate::stats::RunStats;
    use crate::weather::tests::reading_json;
    use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
    use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
    use opentelemetry_proto::tonic::common::v1::any_value;
    use prometheus_client::encoding::text::encode;
    use prometheus_client::registry::Registry;
    use prost::Message;
    use reqwest::header::{HeaderMap, HeaderValue};
    use reqwest::Client;
    use serde_json::{json, Value};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    const CONFIG_PATH: &str = "/v1/objects/meteodata:meteoConfig/meteodata:config";
    const LOCATIONS_PATH: &str = "/v1/objects/meteodata:meteoLocation";

    struct Fixture {
        store: MockServer,
        weather: MockServer,
        ingest: MockServer,
    }

    impl Fixture {
        async fn new() -> Self {
            Self::with_ingest_status(200).await
        }

        async fn with_ingest_status(status: u16) -> Self {
            let fixture = Fixture {
                store: MockServer::start().await,
                weather: MockServer::start().await,
                ingest: MockServer::start().await,
            };

            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&fixture.ingest)
                .await;

            fixture
        }

        fn pipeline(&self) -> Pipeline {
            self.pipeline_with_stats(RunStats::default())
        }

        fn pipeline_with_stats(&self, stats: RunStats) -> Pipeline {
            let settings = PipelineSettings {
                knowledge_store_url: self.store.uri(),
                weather_url: self.weather.uri(),
                ingest_url: self.ingest.uri(),
                service_name: "meteodata".to_owned(),
            };

            Pipeline::new(Client::new(), &settings, stats).unwrap()
        }

        async fn config(&self, level: &str) {
            Mock::given(method("GET"))
                .and(path(CONFIG_PATH))
                .respond_with(
                    ResponseTemplate::new(200).set_body_json(json!({"data": {"name": "meteo", "logLevel": level}})),
                )
                .mount(&self.store)
                .await;
        }

        async fn locations(&self, items: Value) {
            Mock::given(method("GET"))
                .and(path(LOCATIONS_PATH))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": items})))
                .mount(&self.store)
                .await;
        }

        async fn weather(&self, body: Value, expected: u64) {
            Mock::given(method("GET"))
                .and(path("/v1/forecast"))
                .respond_with(ResponseTemplate::new(200).set_body_json(body))
                .expect(expected)
                .mount(&self.weather)
                .await;
        }
    }

    fn trigger_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("layer-id", HeaderValue::from_static("tenant-1"));
        headers.insert("layer-type", HeaderValue::from_static("TENANT"));
        headers.insert("appd-cpty", HeaderValue::from_static("solution"));
        headers.insert("appd-cpid", HeaderValue::from_static("meteodata"));
        headers.insert("x-request-id", HeaderValue::from_static("req-1"));
        headers
    }

    fn one_location() -> Value {
        json!([{"data": {"name": "A", "latitude": 10.0, "longitude": 20.0}}])
    }

    fn two_locations() -> Value {
        json!([
            {"data": {"name": "A", "latitude": 10.0, "longitude": 20.0}},
            {"data": {"name": "B", "latitude": 30.0, "longitude": 40.0}},
        ])
    }

    /// Exports are not awaited by the run, poll until the ingestion mock has seen one.
    async fn wait_for(server: &MockServer, signal_path: &str) -> Vec<Request> {
        for _ in 0..100 {
            let found: Vec<Request> = server
                .received_requests()
                .await
                .unwrap_or_default()
                .into_iter()
                .filter(|r| r.url.path() == signal_path)
                .collect();

            if !found.is_empty() {
                return found;
            }

            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        Vec::new()
    }

    async fn received(server: &MockServer, signal_path: &str) -> usize {
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == signal_path)
            .count()
    }

    fn log_bodies(req: &ExportLogsServiceRequest) -> Vec<String> {
        req.resource_logs[0].scope_logs[0]
            .log_records
            .iter()
            .filter_map(|r| match r.body.as_ref().and_then(|b| b.value.as_ref()) {
                Some(any_value::Value::StringValue(s)) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_status_tokens() {
        assert_eq!("ok", RunStatus::Ok.to_string());
        assert_eq!("error", RunStatus::Error.to_string());
        assert_eq!("DONE(error)", RunState::Done(RunStatus::Error).to_string());
    }

    #[test]
    fn test_invalid_ingest_url() {
        let settings = PipelineSettings {
            knowledge_store_url: "http://store/".to_owned(),
            weather_url: "http://weather/".to_owned(),
            ingest_url: "ingest".to_owned(),
            service_name: "meteodata".to_owned(),
        };

        let res = Pipeline::new(Client::new(), &settings, RunStats::default());
        assert!(matches!(res, Err(PipelineError::Client(_))));
    }

    #[tokio::test]
    async fn test_run_single_location_info_logs() {
        let fixture = Fixture::new().await;
        fixture.config("INFO").await;
        fixture.locations(one_location()).await;
        fixture.weather(reading_json(10.0, 20.0, "2024-01-01T10:00"), 1).await;

        let mut ctx = RunContext::new(trigger_headers());
        let status = fixture.pipeline().execute(&mut ctx).await;
        assert_eq!(RunStatus::Ok, status);
        assert_eq!(RunState::Done(RunStatus::Ok), ctx.state());
        assert!(ctx.log_exporter().is_some());

        let metrics = wait_for(&fixture.ingest, "/v1/metrics").await;
        assert_eq!(1, metrics.len());
        assert_eq!(metrics[0].headers.get("appd-tid").unwrap(), "tenant-1");
        assert_eq!(metrics[0].headers.get("appd-pid").unwrap(), "meteodata");
        assert_eq!(metrics[0].headers.get("appd-pty").unwrap(), "solution");
        assert_eq!(metrics[0].headers.get("x-request-id").unwrap(), "req-1");

        let req = ExportMetricsServiceRequest::decode(metrics[0].body.as_slice()).unwrap();
        assert_eq!(1, req.resource_metrics.len());
        assert_eq!(15, req.resource_metrics[0].scope_metrics[0].metrics.len());

        let logs = wait_for(&fixture.ingest, "/v1/logs").await;
        assert_eq!(1, logs.len());
        assert_eq!(logs[0].headers.get("appd-tid").unwrap(), "tenant-1");

        let req = ExportLogsServiceRequest::decode(logs[0].body.as_slice()).unwrap();
        let records = &req.resource_logs[0].scope_logs[0].log_records;
        assert!(records.iter().all(|r| r.severity_number >= INFO_THRESHOLD));

        let bodies = log_bodies(&req);
        assert!(bodies.iter().any(|b| b.starts_with("trigger received")));
        assert!(bodies.iter().any(|b| b.starts_with("received locations")));
        assert!(!bodies.iter().any(|b| b.starts_with("fetching config")));
    }

    #[tokio::test]
    async fn test_run_rejected_exports_keep_status() {
        let fixture = Fixture::with_ingest_status(500).await;
        fixture.config("INFO").await;
        fixture.locations(one_location()).await;
        fixture.weather(reading_json(10.0, 20.0, "2024-01-01T10:00"), 1).await;

        let mut registry = Registry::default();
        let pipeline = fixture.pipeline_with_stats(RunStats::new(&mut registry));

        let mut ctx = RunContext::new(trigger_headers());
        assert_eq!(RunStatus::Ok, pipeline.execute(&mut ctx).await);
        assert_eq!(RunState::Done(RunStatus::Ok), ctx.state());

        assert_eq!(1, wait_for(&fixture.ingest, "/v1/metrics").await.len());
        assert_eq!(1, wait_for(&fixture.ingest, "/v1/logs").await.len());

        // Outcomes are counted once the spawned exports have seen the response
        let metrics_failed = "meteo_exports_total{signal=\"metrics\",outcome=\"failure\"} 1";
        let logs_failed = "meteo_exports_total{signal=\"logs\",outcome=\"failure\"} 1";
        let mut buf = String::new();
        for _ in 0..100 {
            buf.clear();
            encode(&mut buf, &registry).unwrap();
            if buf.contains(metrics_failed) && buf.contains(logs_failed) {
                break;
            }

            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert!(buf.contains(metrics_failed), "{}", buf);
        assert!(buf.contains(logs_failed), "{}", buf);
        assert!(buf.contains("meteo_runs_total{status=\"ok\"} 1"), "{}", buf);
        assert!(!buf.contains("outcome=\"success\""), "{}", buf);
    }

    #[tokio::test]
    async fn test_run_debug_logs_everything() {
        let fixture = Fixture::new().await;
        fixture.config("DEBUG").await;
        fixture.locations(one_location()).await;
        fixture.weather(reading_json(10.0, 20.0, "2024-01-01T10:00"), 1).await;

        let status = fixture.pipeline().run(trigger_headers()).await;
        assert_eq!(RunStatus::Ok, status);

        let logs = wait_for(&fixture.ingest, "/v1/logs").await;
        let req = ExportLogsServiceRequest::decode(logs[0].body.as_slice()).unwrap();
        let bodies = log_bodies(&req);

        let first = bodies.iter().position(|b| b.starts_with("trigger received")).unwrap();
        let config = bodies.iter().position(|b| b.starts_with("fetching config")).unwrap();
        let start = bodies.iter().position(|b| b == "exported data --- start").unwrap();
        let end = bodies.iter().position(|b| b == "exported data --- end").unwrap();
        assert!(first < config);
        assert!(config < start);
        assert!(start < end);
        assert!(bodies.iter().any(|b| b.starts_with("metric: {cloud_cover}")));
        assert_eq!("exporting logs", bodies.last().unwrap());
    }

    #[tokio::test]
    async fn test_run_config_error_disables_logging() {
        let fixture = Fixture::new().await;
        Mock::given(method("GET"))
            .and(path(CONFIG_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&fixture.store)
            .await;
        fixture.locations(one_location()).await;
        fixture.weather(reading_json(10.0, 20.0, "2024-01-01T10:00"), 1).await;

        let mut ctx = RunContext::new(trigger_headers());
        let status = fixture.pipeline().execute(&mut ctx).await;
        assert_eq!(RunStatus::Ok, status);
        assert!(ctx.config().is_none());
        assert!(ctx.log_exporter().is_none());

        assert_eq!(1, wait_for(&fixture.ingest, "/v1/metrics").await.len());
        assert_eq!(0, received(&fixture.ingest, "/v1/logs").await);
    }

    #[tokio::test]
    async fn test_run_disabled_logging() {
        let fixture = Fixture::new().await;
        fixture.config("OFF").await;
        fixture.locations(one_location()).await;
        fixture.weather(reading_json(10.0, 20.0, "2024-01-01T10:00"), 1).await;

        let mut ctx = RunContext::new(trigger_headers());
        assert_eq!(RunStatus::Ok, fixture.pipeline().execute(&mut ctx).await);
        assert!(ctx.config().is_some());
        assert!(ctx.log_exporter().is_none());
        assert!(ctx.log_resource().is_none());

        assert_eq!(1, wait_for(&fixture.ingest, "/v1/metrics").await.len());
        assert_eq!(0, received(&fixture.ingest, "/v1/logs").await);
    }

    #[tokio::test]
    async fn test_run_no_locations() {
        let fixture = Fixture::new().await;
        fixture.config("INFO").await;
        fixture.locations(json!([])).await;
        fixture.weather(json!([]), 0).await;

        let mut ctx = RunContext::new(trigger_headers());
        assert_eq!(RunStatus::Ok, fixture.pipeline().execute(&mut ctx).await);
        assert_eq!(RunState::Done(RunStatus::Ok), ctx.state());

        assert_eq!(1, wait_for(&fixture.ingest, "/v1/logs").await.len());
        assert_eq!(0, received(&fixture.ingest, "/v1/metrics").await);
    }

    #[tokio::test]
    async fn test_run_locations_error_degrades() {
        let fixture = Fixture::new().await;
        fixture.config("OFF").await;
        Mock::given(method("GET"))
            .and(path(LOCATIONS_PATH))
            .respond_with(ResponseTemplate::new(502))
            .mount(&fixture.store)
            .await;
        fixture.weather(json!([]), 0).await;

        let mut ctx = RunContext::new(trigger_headers());
        assert_eq!(RunStatus::Ok, fixture.pipeline().execute(&mut ctx).await);
        assert!(ctx.locations().is_empty());
    }

    #[tokio::test]
    async fn test_run_weather_error_degrades() {
        let fixture = Fixture::new().await;
        fixture.config("OFF").await;
        fixture.locations(two_locations()).await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&fixture.weather)
            .await;

        let mut ctx = RunContext::new(trigger_headers());
        assert_eq!(RunStatus::Ok, fixture.pipeline().execute(&mut ctx).await);
        assert!(ctx.locations().is_empty());
        assert_eq!(0, received(&fixture.ingest, "/v1/metrics").await);
    }

    #[tokio::test]
    async fn test_run_batch() {
        let fixture = Fixture::new().await;
        fixture.config("OFF").await;
        fixture.locations(two_locations()).await;
        fixture
            .weather(
                json!([
                    reading_json(10.0, 20.0, "2024-01-01T10:00"),
                    reading_json(30.0, 40.0, "2024-01-01T10:00"),
                ]),
                1,
            )
            .await;

        assert_eq!(RunStatus::Ok, fixture.pipeline().run(trigger_headers()).await);

        let metrics = wait_for(&fixture.ingest, "/v1/metrics").await;
        let req = ExportMetricsServiceRequest::decode(metrics[0].body.as_slice()).unwrap();
        assert_eq!(2, req.resource_metrics.len());
    }

    #[tokio::test]
    async fn test_run_malformed_timestamp_aborts() {
        let fixture = Fixture::new().await;
        fixture.config("DEBUG").await;
        fixture.locations(one_location()).await;
        fixture.weather(reading_json(10.0, 20.0, "not a time"), 1).await;

        let mut ctx = RunContext::new(trigger_headers());
        assert_eq!(RunStatus::Error, fixture.pipeline().execute(&mut ctx).await);
        assert_eq!(RunState::Done(RunStatus::Error), ctx.state());

        // Log export is skipped, buffered records are never drained
        assert!(!ctx.logs().is_empty());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(fixture.ingest.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_partial_batch_aborts() {
        let fixture = Fixture::new().await;
        fixture.config("OFF").await;
        fixture.locations(two_locations()).await;
        fixture
            .weather(json!([reading_json(10.0, 20.0, "2024-01-01T10:00")]), 1)
            .await;

        let mut ctx = RunContext::new(trigger_headers());
        assert_eq!(RunStatus::Error, fixture.pipeline().execute(&mut ctx).await);
        assert_eq!(0, received(&fixture.ingest, "/v1/metrics").await);
    }
}
