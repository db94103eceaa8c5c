//! Postfetch core: item metadata, path bookkeeping and pipeline configuration.
mod config;
mod format;
mod kwdict;
mod path;

pub use config::{ConfigError, PathSettings, PipelineConfig, PluginOptions};
pub use format::{render_value, FormatError, Template, MISSING_VALUE};
pub use kwdict::{kwdict_from_value, Kwdict, MTIME_KEY};
pub use path::PathContext;
