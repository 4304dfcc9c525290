use crate::config::Config;
use crate::error::{ImportError, ImportResult};
use crate::pipeline::Pipeline;
use crate::store::MemoryStore;
use crate::tool::{FlowTool, QueryMode, ToolQuery};
use chrono::{TimeZone, Utc};
use std::cell::RefCell;
use std::path::Path;

type Responder = Box<dyn Fn(&ToolQuery) -> ImportResult<Vec<String>>>;

/// Answers tool queries from a closure and remembers every query it saw.
pub struct FakeTool {
    calls: RefCell<Vec<ToolQuery>>,
    responder: Responder,
}

impl FakeTool {
    pub fn new(responder: impl Fn(&ToolQuery) -> ImportResult<Vec<String>> + 'static) -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            responder: Box::new(responder),
        }
    }

    /// Fixed totals for every file, one TCP row of `port` flows for each port query.
    pub fn uniform() -> Self {
        Self::new(|query| {
            Ok(match query.mode {
                QueryMode::Totals => lines(&[
                    "nfdump -I",
                    "Flows: 10",
                    "Flows_tcp: 7",
                    "Flows_udp: 3",
                    "Packets: 100",
                    "Packets_tcp: 60",
                    "Packets_udp: 40",
                    "Bytes: 1000",
                    "Bytes_tcp: 600",
                    "Bytes_udp: 400",
                ]),
                QueryMode::DstPort(port) => vec![
                    "nfdump -s dstport:p".to_string(),
                    "ts,te,td,pr,val,fl,flP,ipkt,ipktP,ibyt,ibytP,ipps,ipbs,ibpp".to_string(),
                    format!(
                        "2024-01-01 00:00:00,2024-01-01 00:04:59,299.0,TCP,{port},{port},50.0,{},50.0,{},50.0,1,2,3",
                        port * 2,
                        port * 3
                    ),
                ],
            })
        })
    }

    pub fn failing() -> Self {
        Self::new(|query| Err(ImportError::tool(format!("{:?}", query.mode), "exit status: 255")))
    }

    pub fn calls(&self) -> Vec<ToolQuery> {
        self.calls.borrow().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl FlowTool for FakeTool {
    fn run(&self, query: &ToolQuery) -> ImportResult<Vec<String>> {
        self.calls.borrow_mut().push(query.clone());
        (self.responder)(query)
    }
}

pub fn lines(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|l| l.to_string()).collect()
}

pub fn config(profile_root: &Path, sources: &[&str], ports: &[u16]) -> Config {
    let mut cfg = Config::default();
    cfg.general.sources = sources.iter().map(|s| s.to_string()).collect();
    cfg.general.ports = ports.to_vec();
    cfg.nfdump.profiles_data = profile_root.to_string_lossy().into_owned();
    cfg.nfdump.profile = "live".to_string();
    cfg
}

pub fn pipeline(cfg: Config, tool: FakeTool) -> Pipeline<FakeTool, MemoryStore> {
    Pipeline::new(cfg, tool, MemoryStore::new())
}

pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> i64 {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap().timestamp()
}
