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

use crate::export::LogExporter;
use crate::metrics::Resource;
use crate::model::{Config, Location, LogLevel};
use crate::pipeline::RunState;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use std::fmt;
use std::sync::Mutex;

/// Lowest OTLP severity number exported when the tenant asked for `INFO` logs.
pub const INFO_THRESHOLD: i32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Severity {
    /// OTLP `SeverityNumber` for the base (non-numbered) variant of each level.
    pub fn number(self) -> i32 {
        match self {
            Self::Trace => 1,
            Self::Debug => 5,
            Self::Info => 9,
            Self::Warn => 13,
            Self::Error => 17,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trace => write!(f, "TRACE"),
            Self::Debug => write!(f, "DEBUG"),
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// A log event produced during a run, kept for export back to the tenant.
///
/// Records carry no resource of their own: the run's log resource is attached to the
/// whole batch when it is encoded for export.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub severity: Severity,
    pub attributes: Vec<(String, String)>,
    pub body: String,
    pub observed_at: DateTime<Utc>,
}

impl LogRecord {
    pub fn new(severity: Severity, message: &str, attributes: &[(&str, String)]) -> Self {
        let body = if attributes.is_empty() {
            message.to_owned()
        } else {
            let params = attributes
                .iter()
                .map(|(k, v)| format!("{}: {{{}}}", k, v))
                .collect::<Vec<_>>()
                .join(", ");

            if message.is_empty() {
                params
            } else {
                format!("{}; {}", message, params)
            }
        };

        LogRecord {
            severity,
            attributes: attributes.iter().map(|(k, v)| ((*k).to_owned(), v.clone())).collect(),
            body,
            observed_at: Utc::now(),
        }
    }
}

/// Append-only buffer of log records, safe to append to from multiple threads.
///
/// The buffer is drained exactly once. Records appended after the drain are discarded.
#[derive(Debug)]
pub struct LogBuffer {
    records: Mutex<Option<Vec<LogRecord>>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        LogBuffer {
            records: Mutex::new(Some(Vec::new())),
        }
    }

    pub fn append(&self, record: LogRecord) {
        match self.records.lock() {
            Ok(mut guard) => {
                if let Some(records) = guard.as_mut() {
                    records.push(record);
                }
            }
            Err(_) => {
                tracing::warn!(message = "can't access run log buffer, dropping record");
            }
        }
    }

    /// Take every buffered record in append order, closing the buffer.
    pub fn drain(&self) -> Vec<LogRecord> {
        match self.records.lock() {
            Ok(mut guard) => guard.take().unwrap_or_default(),
            Err(_) => {
                tracing::warn!(message = "can't access run log buffer, nothing to drain");
                Vec::new()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .map(|guard| guard.as_ref().map(Vec::len).unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Keep the records a tenant asked for at `level`, preserving their relative order.
pub fn filter_records(level: LogLevel, records: Vec<LogRecord>) -> Vec<LogRecord> {
    match level {
        LogLevel::Disabled => Vec::new(),
        LogLevel::Info => records
            .into_iter()
            .filter(|r| r.severity.number() >= INFO_THRESHOLD)
            .collect(),
        LogLevel::Debug => records,
    }
}

/// State for a single run of the pipeline, created when a trigger is received and
/// dropped when the run reaches a terminal state.
#[derive(Debug)]
pub struct RunContext {
    headers: HeaderMap,
    config: Option<Config>,
    locations: Vec<Location>,
    log_exporter: Option<LogExporter>,
    log_resource: Option<Resource>,
    logs: LogBuffer,
    state: RunState,
}

impl RunContext {
    pub fn new(headers: HeaderMap) -> Self {
        RunContext {
            headers,
            config: None,
            locations: Vec::new(),
            log_exporter: None,
            log_resource: None,
            logs: LogBuffer::new(),
            state: RunState::Received,
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn config(&self) -> Option<&Config> {
        self.config.as_ref()
    }

    pub fn set_config(&mut self, config: Option<Config>) {
        self.config = config;
    }

    /// Effective log level of the run, `Disabled` when no config was resolved.
    pub fn log_level(&self) -> LogLevel {
        self.config.as_ref().map(|c| c.log_level).unwrap_or_default()
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    pub fn set_locations(&mut self, locations: Vec<Location>) {
        self.locations = locations;
    }

    pub fn log_exporter(&self) -> Option<&LogExporter> {
        self.log_exporter.as_ref()
    }

    pub fn log_resource(&self) -> Option<&Resource> {
        self.log_resource.as_ref()
    }

    pub fn arm_logging(&mut self, exporter: LogExporter, resource: Resource) {
        self.log_exporter = Some(exporter);
        self.log_resource = Some(resource);
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn advance(&mut self, state: RunState) {
        tracing::debug!(message = "run state transition", from = %self.state, to = %state);
        self.state = state;
    }

    pub fn logs(&self) -> &LogBuffer {
        &self.logs
    }

    /// Emit a process log event and record it for export back to the tenant.
    pub fn log(&self, severity: Severity, message: &str, attributes: &[(&str, String)]) {
        let record = LogRecord::new(severity, message, attributes);
        match severity {
            Severity::Trace => tracing::trace!(message = %record.body),
            Severity::Debug => tracing::debug!(message = %record.body),
            Severity::Info => tracing::info!(message = %record.body),
            Severity::Warn => tracing::warn!(message = %record.body),
            Severity::Error => tracing::error!(message = %record.body),
        }

        self.logs.append(record);
    }
}
