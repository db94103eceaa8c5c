use std::collections::HashMap;
use std::fs;

use postfetch_core::{PathContext, PluginOptions};
use postfetch_logging::pipeline_debug;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{Postprocessor, PostprocessorError};

const NAME: &str = "classify";

const DEFAULT_MAPPING: &[(&str, &[&str])] = &[
    ("Pictures", &["jpg", "jpeg", "png", "gif", "bmp", "svg", "webp"]),
    (
        "Video",
        &["flv", "ogv", "avi", "mp4", "mpg", "mpeg", "3gp", "mkv", "webm", "vob", "wmv"],
    ),
    ("Music", &["mp3", "aac", "flac", "ogg", "wma", "m4a", "wav"]),
    ("Archives", &["zip", "rar", "7z", "tar", "gz", "bz2"]),
];

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ClassifyOptions {
    /// Directory label -> extensions. Kept as a JSON map to preserve order.
    mapping: Option<Map<String, Value>>,
}

/// Routes files into sub-directories keyed by their extension.
#[derive(Debug)]
pub struct ClassifyPostprocessor {
    mapping: HashMap<String, String>,
}

impl ClassifyPostprocessor {
    pub fn new(options: &PluginOptions) -> Result<Self, PostprocessorError> {
        let options: ClassifyOptions = options
            .parse()
            .map_err(|source| PostprocessorError::InvalidOptions { plugin: NAME, source })?;

        let mapping = match options.mapping {
            Some(custom) => invert(custom.iter().map(|(label, exts)| {
                let exts = match exts {
                    Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
                    Value::String(ext) => vec![ext.as_str()],
                    _ => Vec::new(),
                };
                (label.as_str(), exts)
            })),
            None => invert(
                DEFAULT_MAPPING
                    .iter()
                    .map(|(label, exts)| (*label, exts.to_vec())),
            ),
        };

        Ok(Self { mapping })
    }

    pub(crate) fn construct(
        _ctx: &PathContext,
        options: &PluginOptions,
    ) -> Result<Box<dyn Postprocessor>, PostprocessorError> {
        Ok(Box::new(Self::new(options)?))
    }

    /// The inverted extension -> directory label table.
    pub fn mapping(&self) -> &HashMap<String, String> {
        &self.mapping
    }
}

/// Later labels win when an extension is listed more than once.
fn invert<'a>(
    labels: impl Iterator<Item = (&'a str, Vec<&'a str>)>,
) -> HashMap<String, String> {
    let mut mapping = HashMap::new();
    for (label, exts) in labels {
        for ext in exts {
            mapping.insert(ext.to_string(), label.to_string());
        }
    }
    mapping
}

impl Postprocessor for ClassifyPostprocessor {
    fn name(&self) -> &'static str {
        NAME
    }

    fn prepare(&mut self, ctx: &mut PathContext) -> Result<(), PostprocessorError> {
        if let Some(label) = self.mapping.get(ctx.extension()) {
            pipeline_debug!("Classifying {:?} under {:?}", ctx.filename(), label);
            ctx.append_directory(label);
        }
        Ok(())
    }

    fn run(&mut self, ctx: &mut PathContext) -> Result<(), PostprocessorError> {
        if !self.mapping.contains_key(ctx.extension()) {
            return Ok(());
        }
        let directory = ctx.realdirectory();
        fs::create_dir_all(directory).map_err(|source| PostprocessorError::DirectoryCreate {
            path: directory.to_path_buf(),
            source,
        })
    }
}
