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

use crate::pipeline::Pipeline;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

const OPEN_METRICS_TEXT: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";
const PLAIN_TEXT: &str = "text/plain; charset=utf-8";

/// Global state shared between all HTTP requests via Arc.
#[derive(Debug)]
pub struct RequestContext {
    registry: Registry,
    pipeline: Pipeline,
}

impl RequestContext {
    pub fn new(registry: Registry, pipeline: Pipeline) -> Self {
        RequestContext { registry, pipeline }
    }
}

/// Routes for triggering a run and for the process self-metrics.
pub fn router(context: Arc<RequestContext>) -> Router {
    Router::new()
        .route("/", post(trigger_handler))
        .route("/metrics", get(text_metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}

/// Run the pipeline once with the headers of the trigger, answering with the run status.
pub async fn trigger_handler(State(context): State<Arc<RequestContext>>, headers: HeaderMap) -> impl IntoResponse {
    let status = context.pipeline.run(headers).await;
    tracing::info!(message = "run finished", status = %status);

    let mut res_headers = HeaderMap::new();
    res_headers.insert(CONTENT_TYPE, HeaderValue::from_static(PLAIN_TEXT));
    (StatusCode::OK, res_headers, status.to_string())
}

pub async fn text_metrics_handler(State(context): State<Arc<RequestContext>>) -> impl IntoResponse {
    let mut buf = String::new();
    let mut headers = HeaderMap::new();

    match encode(&mut buf, &context.registry) {
        Ok(_) => {
            tracing::debug!(message = "encoded prometheus metrics to text format", bytes = buf.len());
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(OPEN_METRICS_TEXT));
            (StatusCode::OK, headers, buf)
        }
        Err(e) => {
            tracing::error!(message = "error encoding metrics to text format", error = %e);
            (StatusCode::INTERNAL_SERVER_ERROR, headers, String::new())
        }
    }
}
