use crate::capture::CaptureFile;
use crate::error::{ImportError, ImportResult};
use crate::pipeline::Pipeline;
use crate::record::{AggregateRecord, Measure, Metrics, Protocol};
use crate::store::SeriesStore;
use crate::tool::{FlowTool, ToolQuery};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, trace, warn};


// headers: ts,te,td,pr,val,fl,flP,ipkt,ipktP,ibyt,ibytP,ipps,ipbs,ibpp
const BREAKDOWN_COLUMNS: usize = 14;
const COL_PROTOCOL: usize = 3;
const COL_FLOWS: usize = 5;
const COL_PACKETS: usize = 7;
const COL_BYTES: usize = 9;

fn totals_key_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(flows|packets|bytes)(?:_(tcp|udp|icmp|other))?$")
            .expect("totals key regex is valid")
    })
}

/// Parses whole-file `key: value` output. The first line is the echoed command.
///
/// Lines that are not `name: number`, and names outside the fifteen metrics, are
/// ignored. A total the tool left out is derived from its protocol counters.
pub fn parse_totals(lines: &[String]) -> Metrics {
    let mut metrics = Metrics::default();
    let mut reported_totals = [false; 3];

    for line in lines.iter().skip(1) {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let Ok(value) = value.trim().parse::<u64>() else {
            trace!(line = %line, "Ignoring non-numeric summary line");
            continue;
        };
        let Some(caps) = totals_key_regex().captures(name.trim()) else {
            continue;
        };
        let Some(measure) = Measure::from_label(&caps[1]) else {
            continue;
        };

        match caps.get(2).and_then(|p| Protocol::from_suffix(p.as_str())) {
            Some(protocol) => metrics.set_protocol(measure, protocol, value),
            None => {
                metrics.set_total(measure, value);
                reported_totals[measure as usize] = true;
            }
        }
    }

    for measure in Measure::ALL {
        if !reported_totals[measure as usize] {
            metrics.set_total(measure, metrics.protocol_sum(measure));
        }
    }
    if !metrics.is_consistent() {
        debug!(?metrics, "Reported totals differ from protocol sums");
    }
    metrics
}

fn is_header(fields: &[&str]) -> bool {
    fields[0] == "ts" && fields[COL_FLOWS].parse::<u64>().is_err()
}

/// Parses `-s dstport:p -o csv` rows, summing every protocol row into the buckets.
pub fn parse_port_breakdown(lines: &[String]) -> Metrics {
    let mut metrics = Metrics::default();

    for line in lines {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != BREAKDOWN_COLUMNS || is_header(&fields) {
            continue;
        }
        let counts = (
            fields[COL_FLOWS].parse::<u64>(),
            fields[COL_PACKETS].parse::<u64>(),
            fields[COL_BYTES].parse::<u64>(),
        );
        let (Ok(flows), Ok(packets), Ok(bytes)) = counts else {
            trace!(line = %line, "Ignoring breakdown row with non-numeric counts");
            continue;
        };

        let protocol = Protocol::from_label(fields[COL_PROTOCOL]);
        metrics.add(Measure::Flows, protocol, flows);
        metrics.add(Measure::Packets, protocol, packets);
        metrics.add(Measure::Bytes, protocol, bytes);
    }
    metrics
}

impl<T: FlowTool, S: SeriesStore> Pipeline<T, S> {
    /// Totals of one capture file for one source, `None` when `(source, 0)` already covers it.
    pub fn summarize(
        &self,
        capture: &CaptureFile,
        source: &str,
    ) -> ImportResult<Option<AggregateRecord>> {
        if !self.updatable(&capture.path, source, 0)? {
            debug!(file = %capture.name(), source, "Source series not updatable; skipping");
            return Ok(None);
        }

        let query = ToolQuery::totals(&self.config().profile_dir(), source, &capture.path);
        let lines = self.tool().run(&query)?;

        let mut record = AggregateRecord::new(source, 0, capture.timestamp());
        record.metrics = parse_totals(&lines);
        Ok(Some(record))
    }

    /// One record per configured port; `source` of `None` queries all sources combined.
    ///
    /// Ports whose series is already up to date are left out, as are ports whose
    /// tool invocation failed.
    pub fn breakdown(
        &self,
        capture: &CaptureFile,
        source: Option<&str>,
    ) -> ImportResult<Vec<AggregateRecord>> {
        let (series_source, sources) = match source {
            Some(s) => (s.to_string(), vec![s.to_string()]),
            None => (String::new(), self.config().general.sources.clone()),
        };
        let profile_dir = self.config().profile_dir();
        let mut records = Vec::new();

        for &port in &self.config().general.ports {
            if !self.updatable(&capture.path, &series_source, port)? {
                debug!(file = %capture.name(), source = %series_source, port, "Port series not updatable; skipping");
                continue;
            }

            let query = ToolQuery::dst_port(&profile_dir, sources.clone(), &capture.path, port);
            let lines = match self.tool().run(&query) {
                Ok(lines) => lines,
                Err(e @ ImportError::ToolInvocation { .. }) => {
                    warn!(file = %capture.name(), port, error = %e, "Port breakdown failed");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let mut record = AggregateRecord::new(series_source.clone(), port, capture.timestamp());
            record.metrics = parse_port_breakdown(&lines);
            records.push(record);
        }
        Ok(records)
    }
}
