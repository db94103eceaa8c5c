use chrono::{DateTime, NaiveDateTime};
use postfetch_core::{PathContext, PluginOptions, MTIME_KEY};
use postfetch_logging::pipeline_debug;
use serde::Deserialize;
use serde_json::Value;

use crate::{Postprocessor, PostprocessorError};

const NAME: &str = "mtime";

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct MtimeOptions {
    key: String,
}

impl Default for MtimeOptions {
    fn default() -> Self {
        Self {
            key: "date".to_string(),
        }
    }
}

/// Stages an item's modification time under `_mtime` for materialization.
#[derive(Debug)]
pub struct MtimePostprocessor {
    key: String,
}

impl MtimePostprocessor {
    pub fn new(options: &PluginOptions) -> Result<Self, PostprocessorError> {
        let options: MtimeOptions = options
            .parse()
            .map_err(|source| PostprocessorError::InvalidOptions { plugin: NAME, source })?;
        Ok(Self { key: options.key })
    }

    pub(crate) fn construct(
        _ctx: &PathContext,
        options: &PluginOptions,
    ) -> Result<Box<dyn Postprocessor>, PostprocessorError> {
        Ok(Box::new(Self::new(options)?))
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Postprocessor for MtimePostprocessor {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run(&mut self, ctx: &mut PathContext) -> Result<(), PostprocessorError> {
        let Some(value) = ctx.kwdict().get(&self.key) else {
            return Ok(());
        };
        match timestamp_from_value(value) {
            Some(timestamp) => {
                ctx.kwdict_mut()
                    .insert(MTIME_KEY.to_string(), Value::from(timestamp));
            }
            None => pipeline_debug!(
                "Ignoring {:?} = {} for {:?}: not a timestamp",
                self.key,
                value,
                ctx.filename()
            ),
        }
        Ok(())
    }
}

/// POSIX seconds from a number or a date/time string.
///
/// Strings are RFC 3339, or `YYYY-MM-DD HH:MM:SS` taken as UTC.
pub fn timestamp_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(text) => {
            let text = text.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                return Some(parsed.timestamp());
            }
            NAIVE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|naive| naive.and_utc().timestamp())
        }
        _ => None,
    }
}
