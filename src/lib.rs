pub mod capture;
pub mod checkpoint;
pub mod completion;
pub mod config;
pub mod error;
pub mod importer;
pub mod logging;
pub mod pipeline;
pub mod record;
pub mod scanner;
pub mod store;
pub mod summary;
pub mod tool;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{Config, load_config};
pub use error::{ImportError, ImportResult, Outcome};
pub use importer::{FileImport, Importer};
pub use pipeline::Pipeline;
pub use scanner::{ScanOptions, ScanReport, Scanner};
pub use store::{FileStore, MemoryStore, SeriesKey, SeriesStore};
pub use tool::{FlowTool, Nfdump};
