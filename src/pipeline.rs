use crate::config::Config;
use crate::store::{SeriesSchema, SeriesStore};
use crate::tool::FlowTool;

/// Shared context of one import run: configuration, the external tool and the store.
///
/// The checkpoint, summary and writer modules each add their operations to this type;
/// the scanner and the single-file importer drive it.
pub struct Pipeline<T, S> {
    config: Config,
    tool: T,
    store: S,
    schema: SeriesSchema,
}

impl<T: FlowTool, S: SeriesStore> Pipeline<T, S> {
    pub fn new(config: Config, tool: T, store: S) -> Self {
        let schema = SeriesSchema::with_step(config.store.step_seconds);
        Self {
            config,
            tool,
            store,
            schema,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn schema(&self) -> &SeriesSchema {
        &self.schema
    }

    pub fn tool(&self) -> &T {
        &self.tool
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_parts(self) -> (T, S) {
        (self.tool, self.store)
    }
}
