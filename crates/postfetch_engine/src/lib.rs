//! Postfetch engine: postprocessor plugins, their registry and the job driver.
mod archive;
mod classify;
mod error;
mod job;
mod metadata;
mod mtime;
mod persist;
mod postprocessor;
mod registry;

pub use archive::{ArchiveError, ArchivePostprocessor, Compression};
pub use classify::ClassifyPostprocessor;
pub use error::PostprocessorError;
pub use job::{Job, JobError, JobEvent, JobReport, PluginFailure, Stage};
pub use metadata::MetadataPostprocessor;
pub use mtime::{timestamp_from_value, MtimePostprocessor};
pub use persist::{ensure_output_dir, materialize, AtomicFileWriter, PersistError};
pub use postprocessor::{Constructor, Postprocessor};
pub use registry::{PluginEntry, PluginRegistry, ResolveError, Resolver, StaticResolver};
