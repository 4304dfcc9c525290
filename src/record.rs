use std::fmt;


/// Series schema order: each measure's total followed by its protocol buckets.
pub const METRIC_NAMES: [&str; 15] = [
    "flows",
    "flows_tcp",
    "flows_udp",
    "flows_icmp",
    "flows_other",
    "packets",
    "packets_tcp",
    "packets_udp",
    "packets_icmp",
    "packets_other",
    "bytes",
    "bytes_tcp",
    "bytes_udp",
    "bytes_icmp",
    "bytes_other",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Measure {
    Flows,
    Packets,
    Bytes,
}

impl Measure {
    pub const ALL: [Measure; 3] = [Measure::Flows, Measure::Packets, Measure::Bytes];

    pub fn as_str(self) -> &'static str {
        match self {
            Measure::Flows => "flows",
            Measure::Packets => "packets",
            Measure::Bytes => "bytes",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "flows" => Some(Measure::Flows),
            "packets" => Some(Measure::Packets),
            "bytes" => Some(Measure::Bytes),
            _ => None,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    Other,
}

impl Protocol {
    pub const ALL: [Protocol; 4] = [Protocol::Tcp, Protocol::Udp, Protocol::Icmp, Protocol::Other];

    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Icmp => "icmp",
            Protocol::Other => "other",
        }
    }

    /// Strict match on the four bucket names.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix.to_ascii_lowercase().as_str() {
            "tcp" => Some(Protocol::Tcp),
            "udp" => Some(Protocol::Udp),
            "icmp" => Some(Protocol::Icmp),
            "other" => Some(Protocol::Other),
            _ => None,
        }
    }

    /// Maps a protocol column from the tool; anything unrecognised lands in `Other`.
    pub fn from_label(label: &str) -> Self {
        Self::from_suffix(label.trim()).unwrap_or(Protocol::Other)
    }

    fn slot(self) -> usize {
        self as usize + 1
    }
}

/// The fifteen counters of one sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    counters: [[u64; 5]; 3],
}

impl Metrics {
    pub fn total(&self, measure: Measure) -> u64 {
        self.counters[measure.index()][0]
    }

    pub fn protocol(&self, measure: Measure, protocol: Protocol) -> u64 {
        self.counters[measure.index()][protocol.slot()]
    }

    pub fn set_total(&mut self, measure: Measure, value: u64) {
        self.counters[measure.index()][0] = value;
    }

    pub fn set_protocol(&mut self, measure: Measure, protocol: Protocol, value: u64) {
        self.counters[measure.index()][protocol.slot()] = value;
    }

    /// Adds to a protocol bucket and to the measure's total.
    pub fn add(&mut self, measure: Measure, protocol: Protocol, value: u64) {
        let row = &mut self.counters[measure.index()];
        row[protocol.slot()] = row[protocol.slot()].saturating_add(value);
        row[0] = row[0].saturating_add(value);
    }

    pub fn protocol_sum(&self, measure: Measure) -> u64 {
        Protocol::ALL
            .iter()
            .map(|p| self.protocol(measure, *p))
            .fold(0u64, u64::saturating_add)
    }

    /// True when every total equals the sum of its protocol buckets.
    pub fn is_consistent(&self) -> bool {
        Measure::ALL
            .iter()
            .all(|m| self.total(*m) == self.protocol_sum(*m))
    }

    fn position(name: &str) -> Option<(usize, usize)> {
        METRIC_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| (i / 5, i % 5))
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        Self::position(name).map(|(m, p)| self.counters[m][p])
    }

    /// Overwrites the counter called `name`. Returns false for unknown names.
    pub fn set_by_name(&mut self, name: &str, value: u64) -> bool {
        let Some((m, p)) = Self::position(name) else {
            return false;
        };
        self.counters[m][p] = value;
        true
    }

    /// Adds to the counter called `name`; a protocol bucket also feeds its total.
    pub fn add_by_name(&mut self, name: &str, value: u64) -> bool {
        let Some((m, p)) = Self::position(name) else {
            return false;
        };
        let row = &mut self.counters[m];
        row[p] = row[p].saturating_add(value);
        if p != 0 {
            row[0] = row[0].saturating_add(value);
        }
        true
    }

    /// Values in `METRIC_NAMES` order.
    pub fn values(&self) -> [u64; 15] {
        let mut out = [0u64; 15];
        for (i, value) in out.iter_mut().enumerate() {
            *value = self.counters[i / 5][i % 5];
        }
        out
    }

    pub fn from_values(values: &[u64]) -> Option<Self> {
        if values.len() != METRIC_NAMES.len() {
            return None;
        }
        let mut metrics = Metrics::default();
        for (i, value) in values.iter().enumerate() {
            metrics.counters[i / 5][i % 5] = *value;
        }
        Some(metrics)
    }
}

/// One sample destined for the series `(source, port)`.
///
/// An empty `source` is the combined series of all sources, port 0 means unfiltered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateRecord {
    pub source: String,
    pub port: u16,
    pub timestamp: i64,
    pub metrics: Metrics,
}

impl AggregateRecord {
    pub fn new(source: impl Into<String>, port: u16, timestamp: i64) -> Self {
        Self {
            source: source.into(),
            port,
            timestamp,
            metrics: Metrics::default(),
        }
    }
}

impl fmt::Display for AggregateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = if self.source.is_empty() { "*" } else { &self.source };
        write!(
            f,
            "{}:{} @{} flows={} packets={} bytes={}",
            source,
            self.port,
            self.timestamp,
            self.metrics.total(Measure::Flows),
            self.metrics.total(Measure::Packets),
            self.metrics.total(Measure::Bytes)
        )
    }
}
