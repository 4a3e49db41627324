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

//! OTLP/HTTP export of metric points and run logs.
//!
//! Batches are converted to the OTLP protobuf messages and posted to `/v1/metrics` or
//! `/v1/logs` under the ingestion endpoint. Each exporter carries a fixed set of headers
//! that is sent with every request.

use crate::client::{parse_base_url, with_path, CLIENT_USER_AGENT};
use crate::context::LogRecord;
use crate::metrics::{AttributeValue, MetricPoint, MetricValue, Resource};
use chrono::{DateTime, Utc};
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, InstrumentationScope, KeyValue};
use opentelemetry_proto::tonic::logs::v1::{LogRecord as OtlpLogRecord, ResourceLogs, ScopeLogs};
use opentelemetry_proto::tonic::metrics::v1::{
    metric::Data, number_data_point, Gauge, Metric, NumberDataPoint, ResourceMetrics, ScopeMetrics,
};
use opentelemetry_proto::tonic::resource::v1::Resource as OtlpResource;
use prost::Message;
use reqwest::header::{HeaderMap, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, StatusCode, Url};
use std::future::Future;
use std::sync::Arc;

const PROTOBUF: &str = "application/x-protobuf";
const SCOPE_NAME: &str = "meteodata";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("invalid ingestion endpoint {0}")]
    Endpoint(String),
    #[error("export rejected with status {0} by {1}")]
    Rejected(StatusCode, Url),
}

fn unix_nanos(t: DateTime<Utc>) -> u64 {
    t.timestamp_nanos_opt()
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or_default()
}

fn string_value(s: &str) -> AnyValue {
    AnyValue {
        value: Some(any_value::Value::StringValue(s.to_owned())),
    }
}

fn key_value(key: &str, value: AnyValue) -> KeyValue {
    KeyValue {
        key: key.to_owned(),
        value: Some(value),
    }
}

fn scope() -> InstrumentationScope {
    InstrumentationScope {
        name: SCOPE_NAME.to_owned(),
        ..Default::default()
    }
}

fn to_otlp_resource(resource: &Resource) -> OtlpResource {
    let attributes = resource
        .attributes()
        .iter()
        .map(|(k, v)| {
            let value = match v {
                AttributeValue::String(s) => string_value(s),
                AttributeValue::Double(d) => AnyValue {
                    value: Some(any_value::Value::DoubleValue(*d)),
                },
            };

            key_value(k, value)
        })
        .collect();

    OtlpResource {
        attributes,
        ..Default::default()
    }
}

fn to_metric(point: &MetricPoint) -> Metric {
    let value = match point.value {
        MetricValue::Int(v) => number_data_point::Value::AsInt(v),
        MetricValue::Float(v) => number_data_point::Value::AsDouble(v),
    };

    Metric {
        name: point.name.to_owned(),
        unit: point.unit.to_owned(),
        data: Some(Data::Gauge(Gauge {
            data_points: vec![NumberDataPoint {
                start_time_unix_nano: unix_nanos(point.start),
                time_unix_nano: unix_nanos(point.end),
                value: Some(value),
                ..Default::default()
            }],
        })),
        ..Default::default()
    }
}

/// Convert points to an OTLP request with one `ResourceMetrics` per run of points that
/// share a resource descriptor.
pub fn encode_metrics(points: &[MetricPoint]) -> ExportMetricsServiceRequest {
    let mut resource_metrics: Vec<ResourceMetrics> = Vec::new();
    let mut current: Option<&Arc<Resource>> = None;

    for point in points {
        if !current.map(|r| Arc::ptr_eq(r, &point.resource)).unwrap_or(false) {
            resource_metrics.push(ResourceMetrics {
                resource: Some(to_otlp_resource(&point.resource)),
                scope_metrics: vec![ScopeMetrics {
                    scope: Some(scope()),
                    ..Default::default()
                }],
                ..Default::default()
            });
            current = Some(&point.resource);
        }

        if let Some(scope_metrics) = resource_metrics.last_mut().and_then(|r| r.scope_metrics.last_mut()) {
            scope_metrics.metrics.push(to_metric(point));
        }
    }

    ExportMetricsServiceRequest { resource_metrics }
}

fn to_log_record(record: &LogRecord) -> OtlpLogRecord {
    OtlpLogRecord {
        observed_time_unix_nano: unix_nanos(record.observed_at),
        severity_number: record.severity.number(),
        severity_text: record.severity.to_string(),
        body: Some(string_value(&record.body)),
        attributes: record
            .attributes
            .iter()
            .map(|(k, v)| key_value(k, string_value(v)))
            .collect(),
        ..Default::default()
    }
}

/// Convert log records to an OTLP request under a single resource.
pub fn encode_logs(resource: &Resource, records: &[LogRecord]) -> ExportLogsServiceRequest {
    ExportLogsServiceRequest {
        resource_logs: vec![ResourceLogs {
            resource: Some(to_otlp_resource(resource)),
            scope_logs: vec![ScopeLogs {
                scope: Some(scope()),
                log_records: records.iter().map(to_log_record).collect(),
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

#[derive(Debug, Clone)]
struct OtlpTransport {
    client: Client,
    url: Url,
    headers: HeaderMap,
}

impl OtlpTransport {
    fn new(client: Client, endpoint: &str, signal: &str, headers: HeaderMap) -> Result<Self, ExportError> {
        let base = parse_base_url(endpoint).map_err(|_| ExportError::Endpoint(endpoint.to_owned()))?;
        Ok(OtlpTransport {
            client,
            url: with_path(&base, &["v1", signal]),
            headers,
        })
    }

    async fn send(self, body: Vec<u8>) -> Result<(), ExportError> {
        tracing::debug!(message = "sending OTLP export", url = %self.url, num_bytes = body.len());

        let res = self
            .client
            .post(self.url.clone())
            .headers(self.headers)
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .header(CONTENT_TYPE, PROTOBUF)
            .body(body)
            .send()
            .await?;

        let status = res.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ExportError::Rejected(status, self.url))
        }
    }
}

/// Exporter for metric point batches.
#[derive(Debug, Clone)]
pub struct MetricExporter {
    transport: OtlpTransport,
}

impl MetricExporter {
    pub fn new(client: Client, endpoint: &str, headers: HeaderMap) -> Result<Self, ExportError> {
        Ok(MetricExporter {
            transport: OtlpTransport::new(client, endpoint, "metrics", headers)?,
        })
    }

    pub fn url(&self) -> &Url {
        &self.transport.url
    }

    /// Encode `points` immediately and return a future that completes once the
    /// ingestion endpoint has answered. The future owns everything it needs.
    pub fn export(&self, points: &[MetricPoint]) -> impl Future<Output = Result<(), ExportError>> + Send + 'static {
        let body = encode_metrics(points).encode_to_vec();
        self.transport.clone().send(body)
    }
}

/// Exporter for run log batches, only created when the tenant enabled logging.
#[derive(Debug, Clone)]
pub struct LogExporter {
    transport: OtlpTransport,
}

impl LogExporter {
    pub fn new(client: Client, endpoint: &str, headers: HeaderMap) -> Result<Self, ExportError> {
        Ok(LogExporter {
            transport: OtlpTransport::new(client, endpoint, "logs", headers)?,
        })
    }

    pub fn url(&self) -> &Url {
        &self.transport.url
    }

    /// Encode `records` immediately and return a future that completes once the
    /// ingestion endpoint has answered.
    pub fn export(
        &self,
        resource: &Resource,
        records: &[LogRecord],
    ) -> impl Future<Output = Result<(), ExportError>> + Send + 'static {
        let body = encode_logs(resource, records).encode_to_vec();
        self.transport.clone().send(body)
    }
}
