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

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct RunLabels {
    status: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ExportLabels {
    signal: String,
    outcome: String,
}

/// Counters describing pipeline runs of this process.
///
/// All metrics are registered upon call to `RunStats::new()` and share the
/// prefix "meteo_". Clones share the same underlying values.
#[derive(Debug, Clone)]
pub struct RunStats {
    runs: Family<RunLabels, Counter>,
    exports: Family<ExportLabels, Counter>,
    points: Gauge,
}

impl RunStats {
    pub fn new(reg: &mut Registry) -> Self {
        let runs = Family::<RunLabels, Counter>::default();
        let exports = Family::<ExportLabels, Counter>::default();
        let points = Gauge::default();

        reg.register("meteo_runs", "Pipeline runs by terminal status", runs.clone());
        reg.register(
            "meteo_exports",
            "Telemetry exports by signal and outcome",
            exports.clone(),
        );
        reg.register(
            "meteo_metric_points",
            "Metric points produced by the most recent run",
            points.clone(),
        );

        Self { runs, exports, points }
    }

    pub fn run(&self, status: &str) {
        self.runs
            .get_or_create(&RunLabels {
                status: status.to_owned(),
            })
            .inc();
    }

    pub fn export(&self, signal: &str, success: bool) {
        self.exports
            .get_or_create(&ExportLabels {
                signal: signal.to_owned(),
                outcome: if success { "success" } else { "failure" }.to_owned(),
            })
            .inc();
    }

    pub fn points(&self, count: usize) {
        self.points.set(i64::try_from(count).unwrap_or(i64::MAX));
    }
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new(&mut Registry::default())
    }
}
