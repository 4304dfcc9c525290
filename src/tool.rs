use crate::error::{ImportError, ImportResult};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;
use tracing::{debug, trace};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// Whole-file totals (`-I`).
    Totals,
    /// Per destination port statistics filtered to one port (`-s dstport:p`).
    DstPort(u16),
}

/// One invocation of the summarization tool against a capture file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolQuery {
    pub profile_dir: PathBuf,
    pub sources: Vec<String>,
    /// Capture path relative to each source directory (`YYYY/MM/DD/nfcapd.*`).
    pub capture: PathBuf,
    pub mode: QueryMode,
}

impl ToolQuery {
    pub fn totals(profile_dir: &Path, source: &str, capture: &Path) -> Self {
        Self {
            profile_dir: profile_dir.to_path_buf(),
            sources: vec![source.to_string()],
            capture: capture.to_path_buf(),
            mode: QueryMode::Totals,
        }
    }

    pub fn dst_port(profile_dir: &Path, sources: Vec<String>, capture: &Path, port: u16) -> Self {
        Self {
            profile_dir: profile_dir.to_path_buf(),
            sources,
            capture: capture.to_path_buf(),
            mode: QueryMode::DstPort(port),
        }
    }

    /// `-M` takes `<profile_dir>/<src1>:<src2>...`.
    pub fn multi_dir(&self) -> String {
        let joined = self.sources.join(":");
        self.profile_dir.join(joined).to_string_lossy().into_owned()
    }

    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-M".to_string(),
            self.multi_dir(),
            "-r".to_string(),
            self.capture.to_string_lossy().into_owned(),
        ];
        match self.mode {
            QueryMode::Totals => args.push("-I".to_string()),
            QueryMode::DstPort(port) => {
                args.extend([
                    "-s".to_string(),
                    "dstport:p".to_string(),
                    "-o".to_string(),
                    "csv".to_string(),
                    format!("dst port {port}"),
                ]);
            }
        }
        args
    }
}

/// Runs the external summarization tool.
///
/// The returned lines start with the echoed command, followed by the tool's output.
pub trait FlowTool {
    fn run(&self, query: &ToolQuery) -> ImportResult<Vec<String>>;
}

/// Invokes the `nfdump` binary and waits for it to finish.
#[derive(Debug, Clone)]
pub struct Nfdump {
    binary: PathBuf,
}

impl Nfdump {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn command_line(&self, query: &ToolQuery) -> String {
        let mut line = self.binary.to_string_lossy().into_owned();
        for arg in query.args() {
            line.push(' ');
            if arg.contains(' ') {
                line.push_str(&format!("'{arg}'"));
            } else {
                line.push_str(&arg);
            }
        }
        line
    }
}

impl FlowTool for Nfdump {
    fn run(&self, query: &ToolQuery) -> ImportResult<Vec<String>> {
        let command_line = self.command_line(query);
        let start = Instant::now();
        debug!(command = %command_line, "Running nfdump");

        let output = Command::new(&self.binary)
            .args(query.args())
            .output()
            .map_err(|e| ImportError::tool(&command_line, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = match stderr.trim() {
                "" => output.status.to_string(),
                msg => format!("{}: {}", output.status, msg),
            };
            return Err(ImportError::tool(&command_line, reason));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut lines = Vec::with_capacity(stdout.lines().count() + 1);
        lines.push(command_line);
        lines.extend(stdout.lines().map(str::to_string));

        trace!(
            lines = lines.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "nfdump finished"
        );
        Ok(lines)
    }
}
