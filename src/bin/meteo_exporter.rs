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

use clap::Parser;
use meteo_exporter::http::RequestContext;
use meteo_exporter::pipeline::{Pipeline, PipelineSettings};
use meteo_exporter::stats::RunStats;
use prometheus_client::registry::Registry;
use reqwest::Client;
use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{self, SignalKind};
use tracing::Level;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 8080);
const DEFAULT_TIMEOUT_MILLIS: u64 = 5000;
const DEFAULT_WEATHER_URL: &str = "https://api.open-meteo.com/";
const DEFAULT_SERVICE_NAME: &str = "meteodata";

#[derive(Debug, Parser)]
#[clap(name = "meteo_exporter", version = clap::crate_version!())]
struct MeteoExporterApplication {
    /// Base URL of the knowledge store holding tenant config and locations
    #[clap(long, env = "METEO_KNOWLEDGE_STORE_URL")]
    knowledge_store_url: String,

    /// Base URL of the OTLP/HTTP ingestion endpoint. Metrics and logs are sent to the
    /// `/v1/metrics` and `/v1/logs` paths under it.
    #[clap(long, env = "METEO_INGEST_URL")]
    ingest_url: String,

    /// Base URL for the Open-Meteo API
    #[clap(long, env = "METEO_WEATHER_URL", default_value_t = DEFAULT_WEATHER_URL.into())]
    weather_url: String,

    /// Value of the service tag attached to every exported metric and log
    #[clap(long, default_value_t = DEFAULT_SERVICE_NAME.into())]
    service_name: String,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Timeout for each request made to the knowledge store, Open-Meteo, or the ingestion
    /// endpoint, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_MILLIS)]
    timeout_millis: u64,

    /// Address to bind to. By default, meteo_exporter will bind to public address since
    /// the purpose is to be triggered by an external scheduler.
    #[clap(long, default_value_t = DEFAULT_BIND_ADDR.into())]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = MeteoExporterApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let timeout = Duration::from_millis(opts.timeout_millis);
    let http_client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize HTTP client", error = %e);
        process::exit(1)
    });

    let settings = PipelineSettings {
        knowledge_store_url: opts.knowledge_store_url.clone(),
        weather_url: opts.weather_url.clone(),
        ingest_url: opts.ingest_url.clone(),
        service_name: opts.service_name.clone(),
    };

    let mut registry = Registry::default();
    let stats = RunStats::new(&mut registry);
    let pipeline = Pipeline::new(http_client, &settings, stats).unwrap_or_else(|e| {
        tracing::error!(message = "invalid service configuration", error = %e);
        process::exit(1)
    });

    let context = Arc::new(RequestContext::new(registry, pipeline));
    let server = axum::Server::try_bind(&opts.bind)
        .map(|s| {
            s.serve(meteo_exporter::http::router(context).into_make_service())
                .with_graceful_shutdown(async {
                    // Wait for either SIGTERM or SIGINT to shutdown
                    tokio::select! {
                        _ = sigterm() => {}
                        _ = sigint() => {}
                    }
                })
        })
        .unwrap_or_else(|e| {
            tracing::error!(message = "error binding to address", address = %opts.bind, error = %e);
            process::exit(1)
        });

    tracing::info!(
        message = "server started",
        address = %opts.bind,
        knowledge_store_url = %opts.knowledge_store_url,
        ingest_url = %opts.ingest_url,
        weather_url = %opts.weather_url,
    );
    server.await?;

    tracing::info!("server shutdown");
    Ok(())
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    unix::signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}
