use postfetch_core::{PathContext, PluginOptions};

use crate::PostprocessorError;

/// One link of the post-processing chain.
///
/// For every item the driver calls `prepare` on all plugins, then `run` on
/// all plugins, in registration order. `finalize` is called once at job end
/// and must tolerate being called again.
pub trait Postprocessor: Send {
    /// Category name the plugin was registered under.
    fn name(&self) -> &'static str;

    /// Inspect or alter the target path before the file is materialized.
    fn prepare(&mut self, _ctx: &mut PathContext) -> Result<(), PostprocessorError> {
        Ok(())
    }

    /// Perform the side effect once the bytes exist at `ctx.temppath()`.
    fn run(&mut self, ctx: &mut PathContext) -> Result<(), PostprocessorError>;

    /// Release held resources.
    fn finalize(&mut self) -> Result<(), PostprocessorError> {
        Ok(())
    }
}

/// Builds a plugin for the directory context described by `ctx`.
pub type Constructor =
    fn(&PathContext, &PluginOptions) -> Result<Box<dyn Postprocessor>, PostprocessorError>;
