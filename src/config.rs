use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};


#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default = "default_ports")]
    pub ports: Vec<u16>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NfdumpConfig {
    #[serde(default = "default_nfdump_binary")]
    pub binary: String,
    #[serde(default = "default_profiles_data")]
    pub profiles_data: String,
    #[serde(default = "default_profile")]
    pub profile: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_step_seconds")]
    pub step_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportConfig {
    #[serde(default = "default_true")]
    pub process_ports: bool,
    #[serde(default = "default_false")]
    pub process_ports_by_source: bool,
    #[serde(default = "default_true")]
    pub check_last_update: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub nfdump: NfdumpConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            ports: default_ports(),
        }
    }
}

impl Default for NfdumpConfig {
    fn default() -> Self {
        Self {
            binary: default_nfdump_binary(),
            profiles_data: default_profiles_data(),
            profile: default_profile(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            step_seconds: default_step_seconds(),
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            process_ports: true,
            process_ports_by_source: false,
            check_last_update: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Config {
    /// `<profiles_data>/<profile>`, the directory holding one subdirectory per source.
    pub fn profile_dir(&self) -> PathBuf {
        Path::new(&self.nfdump.profiles_data).join(&self.nfdump.profile)
    }

    pub fn source_dir(&self, source: &str) -> PathBuf {
        self.profile_dir().join(source)
    }

    pub fn is_last_source(&self, source: &str) -> bool {
        self.general.sources.last().is_some_and(|s| s == source)
    }

    pub fn validate(&self) -> Result<()> {
        if self.general.sources.is_empty() {
            bail!("general.sources must list at least one source");
        }
        let mut seen = HashSet::new();
        for source in &self.general.sources {
            if source.trim().is_empty() {
                bail!("general.sources contains an empty name");
            }
            if source.contains(':') || source.contains('/') {
                bail!("source name `{source}` must not contain ':' or '/'");
            }
            let port_suffix = source
                .rsplit_once('_')
                .is_some_and(|(_, tail)| !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()));
            if source == "all" || source.bytes().all(|b| b.is_ascii_digit()) || port_suffix {
                bail!("source name `{source}` would clash with another series file");
            }
            if !seen.insert(source.as_str()) {
                bail!("source `{source}` is listed twice");
            }
        }
        if self.general.ports.contains(&0) {
            bail!("general.ports must not contain 0");
        }
        if self.store.step_seconds == 0 {
            bail!("store.step_seconds must be positive");
        }
        Ok(())
    }
}

fn default_ports() -> Vec<u16> {
    vec![80, 443, 22, 53]
}

fn default_nfdump_binary() -> String {
    "/usr/bin/nfdump".to_string()
}

fn default_profiles_data() -> String {
    "/var/nfdump/profiles-data".to_string()
}

fn default_profile() -> String {
    "live".to_string()
}

fn default_data_dir() -> String {
    "/var/lib/nfimport".to_string()
}

fn default_step_seconds() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

pub fn expand_path(path: &str) -> String {
    if path == "~" {
        return std::env::var("HOME").unwrap_or_else(|_| path.to_string());
    }
    if let Some(rest) = path.strip_prefix("~/")
        && let Ok(home) = std::env::var("HOME")
    {
        return format!("{home}/{rest}");
    }
    path.to_string()
}

fn normalize_config(mut cfg: Config) -> Config {
    cfg.nfdump.binary = expand_path(&cfg.nfdump.binary);
    cfg.nfdump.profiles_data = expand_path(&cfg.nfdump.profiles_data);
    cfg.store.data_dir = expand_path(&cfg.store.data_dir);
    cfg.logging.file = cfg.logging.file.as_deref().map(expand_path);
    for source in &mut cfg.general.sources {
        *source = source.trim().to_string();
    }
    cfg
}

pub fn parse_config(content: &str) -> Result<Config> {
    let cfg: Config = toml::from_str(content).context("failed to parse TOML config")?;
    let cfg = normalize_config(cfg);
    cfg.validate()?;
    Ok(cfg)
}

pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read config {}", path.as_ref().display()))?;
    parse_config(&content)
        .with_context(|| format!("invalid config {}", path.as_ref().display()))
}
