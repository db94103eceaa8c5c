use std::fmt;
use std::path::PathBuf;

use postfetch_core::{FormatError, Kwdict, PathContext, PipelineConfig};
use postfetch_logging::{pipeline_debug, pipeline_error, pipeline_info, pipeline_warn};
use thiserror::Error;

use crate::persist::{ensure_output_dir, materialize, PersistError};
use crate::registry::{PluginRegistry, Resolver, StaticResolver};
use crate::{Postprocessor, PostprocessorError};

#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid path template: {0}")]
    Template(#[from] FormatError),
    #[error("base directory unusable: {0}")]
    BaseDirectory(#[from] PersistError),
}

/// What the fetch side yields, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    /// Items that follow belong to the directory described by this metadata.
    Directory(Kwdict),
    /// A fetched file whose bytes sit at `temppath`.
    File { kwdict: Kwdict, temppath: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Construct,
    Prepare,
    Run,
    Finalize,
    Materialize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Construct => write!(f, "construct"),
            Stage::Prepare => write!(f, "prepare"),
            Stage::Run => write!(f, "run"),
            Stage::Finalize => write!(f, "finalize"),
            Stage::Materialize => write!(f, "materialize"),
        }
    }
}

/// A recorded, non-aborting failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginFailure {
    pub plugin: String,
    pub stage: Stage,
    pub filename: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobReport {
    /// File events seen.
    pub items: usize,
    /// Items whose chain completed without an item-fatal failure.
    pub completed: usize,
    pub failures: Vec<PluginFailure>,
}

/// Drives directory and file events through the configured postprocessors.
///
/// Processing is strictly sequential: every `prepare` and `run` of one
/// item completes before the next item starts. A new plugin chain is built
/// whenever the real directory changes, after finalizing the previous one.
pub struct Job<R = StaticResolver> {
    config: PipelineConfig,
    registry: PluginRegistry<R>,
    ctx: PathContext,
    chain: Vec<Box<dyn Postprocessor>>,
    chain_directory: Option<PathBuf>,
    directory_kwdict: Kwdict,
    report: JobReport,
}

impl Job<StaticResolver> {
    pub fn new(config: PipelineConfig) -> Result<Self, JobError> {
        Self::with_registry(config, PluginRegistry::new())
    }
}

impl<R: Resolver> Job<R> {
    pub fn with_registry(
        config: PipelineConfig,
        registry: PluginRegistry<R>,
    ) -> Result<Self, JobError> {
        let ctx = PathContext::new(&config.paths)?;
        ensure_output_dir(&config.paths.base_directory)?;
        Ok(Self {
            config,
            registry,
            ctx,
            chain: Vec::new(),
            chain_directory: None,
            directory_kwdict: Kwdict::new(),
            report: JobReport::default(),
        })
    }

    /// Process every event, then finalize all plugins.
    pub fn run(mut self, events: impl IntoIterator<Item = JobEvent>) -> JobReport {
        for event in events {
            self.handle(event);
        }
        self.finish()
    }

    pub fn handle(&mut self, event: JobEvent) {
        match event {
            JobEvent::Directory(kwdict) => self.enter_directory(&kwdict),
            JobEvent::File { kwdict, temppath } => self.process_file(kwdict, temppath),
        }
    }

    /// Finalize the current chain and return the report.
    pub fn finish(mut self) -> JobReport {
        self.finalize_chain();
        pipeline_info!(
            "Job finished: {} items, {} completed, {} failures",
            self.report.items,
            self.report.completed,
            self.report.failures.len()
        );
        self.report
    }

    pub fn report(&self) -> &JobReport {
        &self.report
    }

    /// Names of the plugins in the active chain, in order.
    pub fn chain(&self) -> Vec<&'static str> {
        self.chain.iter().map(|pp| pp.name()).collect()
    }

    fn enter_directory(&mut self, kwdict: &Kwdict) {
        self.directory_kwdict = kwdict.clone();
        self.ctx.set_directory(kwdict);
        let directory = self.ctx.realdirectory().to_path_buf();
        if self.chain_directory.as_ref() == Some(&directory) {
            return;
        }
        self.finalize_chain();
        pipeline_debug!("Entering directory {:?}", directory);
        self.build_chain();
        self.chain_directory = Some(directory);
    }

    fn build_chain(&mut self) {
        for options in &self.config.postprocessors {
            let Some(entry) = self.registry.find_value(options.name()) else {
                pipeline_warn!("Skipping unknown postprocessor {:?}", options.name());
                continue;
            };
            match (entry.constructor())(&self.ctx, options) {
                Ok(pp) => self.chain.push(pp),
                Err(err) => {
                    pipeline_error!("Failed to set up {}: {}", entry.category(), err);
                    self.report.failures.push(PluginFailure {
                        plugin: entry.category().to_string(),
                        stage: Stage::Construct,
                        filename: None,
                        message: err.to_string(),
                    });
                }
            }
        }
    }

    fn finalize_chain(&mut self) {
        for mut pp in self.chain.drain(..) {
            if let Err(err) = pp.finalize() {
                pipeline_error!("{} failed to finalize: {}", pp.name(), err);
                self.report.failures.push(PluginFailure {
                    plugin: pp.name().to_string(),
                    stage: Stage::Finalize,
                    filename: None,
                    message: err.to_string(),
                });
            }
        }
        self.chain_directory = None;
    }

    fn process_file(&mut self, kwdict: Kwdict, temppath: PathBuf) {
        if self.chain_directory.is_none() {
            self.enter_directory(&kwdict);
        }
        self.report.items += 1;
        self.ctx.set_filename(kwdict);
        self.ctx.set_temppath(temppath);

        let mut item_failed = false;
        for stage in [Stage::Prepare, Stage::Run] {
            for pp in self.chain.iter_mut() {
                let result = match stage {
                    Stage::Prepare => pp.prepare(&mut self.ctx),
                    _ => pp.run(&mut self.ctx),
                };
                if let Err(err) = result {
                    item_failed |= err.is_item_fatal();
                    record(&mut self.report, pp.name(), stage, &self.ctx, &err);
                }
            }
        }

        if item_failed {
            pipeline_warn!("Leaving {:?} in place after a fatal failure", self.ctx.temppath());
        } else {
            match materialize(&self.ctx) {
                Ok(target) => {
                    if let Some(target) = target {
                        pipeline_debug!("Stored {:?}", target);
                    }
                    self.report.completed += 1;
                }
                Err(err) => {
                    pipeline_error!("Failed to store {:?}: {}", self.ctx.realpath(), err);
                    self.report.failures.push(PluginFailure {
                        plugin: "materialize".to_string(),
                        stage: Stage::Materialize,
                        filename: Some(self.ctx.filename().to_string()),
                        message: err.to_string(),
                    });
                }
            }
        }

        self.ctx.clear_temppath();
        // Plugins may have extended the directory for this item only.
        self.ctx.set_directory(&self.directory_kwdict);
    }
}

fn record(
    report: &mut JobReport,
    plugin: &str,
    stage: Stage,
    ctx: &PathContext,
    err: &PostprocessorError,
) {
    pipeline_warn!("{} {} failed for {:?}: {}", plugin, stage, ctx.filename(), err);
    report.failures.push(PluginFailure {
        plugin: plugin.to_string(),
        stage,
        filename: Some(ctx.filename().to_string()),
        message: err.to_string(),
    });
}
