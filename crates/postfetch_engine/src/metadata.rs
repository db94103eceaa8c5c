use std::fmt::Write as _;

use postfetch_core::{render_value, Kwdict, PathContext, PluginOptions, Template};
use postfetch_logging::pipeline_debug;
use serde::ser::Serialize;
use serde::Deserialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;

use crate::persist::AtomicFileWriter;
use crate::{Postprocessor, PostprocessorError};

const NAME: &str = "metadata";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Mode {
    #[default]
    Json,
    Tags,
    Custom,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct MetadataOptions {
    mode: Mode,
    extension: Option<String>,
    ascii: bool,
    indent: Option<usize>,
    format: Option<String>,
}

impl Default for MetadataOptions {
    fn default() -> Self {
        Self {
            mode: Mode::Json,
            extension: None,
            ascii: false,
            indent: Some(4),
            format: None,
        }
    }
}

/// The representation written for each item.
#[derive(Debug, Clone)]
enum Writer {
    Json { ascii: bool, indent: Option<usize> },
    Tags,
    Custom(Template),
}

/// Writes a sidecar file next to each item: JSON, a tag list or a custom template.
#[derive(Debug)]
pub struct MetadataPostprocessor {
    writer: Writer,
    extension: String,
}

impl MetadataPostprocessor {
    pub fn new(options: &PluginOptions) -> Result<Self, PostprocessorError> {
        let options: MetadataOptions = options
            .parse()
            .map_err(|source| PostprocessorError::InvalidOptions { plugin: NAME, source })?;

        let (writer, default_extension) = match options.mode {
            Mode::Json => (
                Writer::Json {
                    ascii: options.ascii,
                    indent: options.indent,
                },
                "json",
            ),
            Mode::Tags => (Writer::Tags, "txt"),
            Mode::Custom => {
                let format = options.format.ok_or(PostprocessorError::MissingOption {
                    plugin: NAME,
                    option: "format",
                })?;
                let template = Template::parse(&format)
                    .map_err(|source| PostprocessorError::InvalidTemplate { plugin: NAME, source })?;
                (Writer::Custom(template), "txt")
            }
        };

        Ok(Self {
            writer,
            extension: options
                .extension
                .unwrap_or_else(|| default_extension.to_string()),
        })
    }

    pub(crate) fn construct(
        _ctx: &PathContext,
        options: &PluginOptions,
    ) -> Result<Box<dyn Postprocessor>, PostprocessorError> {
        Ok(Box::new(Self::new(options)?))
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Render the sidecar content; `None` when there is nothing to write.
    fn render(&self, kwdict: &Kwdict) -> Result<Option<String>, PostprocessorError> {
        match &self.writer {
            Writer::Json { ascii, indent } => render_json(kwdict, *ascii, *indent)
                .map(Some)
                .map_err(|source| PostprocessorError::Serialize { plugin: NAME, source }),
            Writer::Tags => {
                let tags = collect_tags(kwdict);
                if tags.is_empty() {
                    return Ok(None);
                }
                let mut out = tags.join("\n");
                out.push('\n');
                Ok(Some(out))
            }
            Writer::Custom(template) => Ok(Some(template.render(kwdict))),
        }
    }
}

impl Postprocessor for MetadataPostprocessor {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run(&mut self, ctx: &mut PathContext) -> Result<(), PostprocessorError> {
        let Some(content) = self.render(ctx.kwdict())? else {
            pipeline_debug!("No metadata to write for {:?}", ctx.filename());
            return Ok(());
        };

        let filename = format!("{}.{}", ctx.filename(), self.extension);
        let writer = AtomicFileWriter::new(ctx.realdirectory().to_path_buf());
        writer
            .write(&filename, &content)
            .map_err(|source| PostprocessorError::Sidecar {
                path: ctx.realdirectory().join(&filename),
                source,
            })?;
        Ok(())
    }
}

fn render_json(
    kwdict: &Kwdict,
    ascii: bool,
    indent: Option<usize>,
) -> Result<String, serde_json::Error> {
    let mut out = match indent {
        Some(width) => {
            let indent = " ".repeat(width);
            let mut buf = Vec::new();
            let formatter = PrettyFormatter::with_indent(indent.as_bytes());
            let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
            kwdict.serialize(&mut ser)?;
            // serde_json only emits UTF-8.
            String::from_utf8_lossy(&buf).into_owned()
        }
        None => serde_json::to_string(kwdict)?,
    };
    if ascii {
        out = escape_non_ascii(&out);
    }
    out.push('\n');
    Ok(out)
}

/// Non-ASCII characters only occur inside JSON strings, so escaping them
/// in the serialized text keeps the document valid.
fn escape_non_ascii(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() {
            out.push(c);
            continue;
        }
        let mut units = [0u16; 2];
        for unit in c.encode_utf16(&mut units) {
            let _ = write!(out, "\\u{:04x}", unit);
        }
    }
    out
}

fn collect_tags(kwdict: &Kwdict) -> Vec<String> {
    let tags = kwdict.get("tags").or_else(|| kwdict.get("tag_string"));
    match tags {
        Some(Value::Array(items)) => items.iter().map(render_value).collect(),
        Some(Value::String(text)) if text.contains(',') => text
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(text)) => text.split_whitespace().map(str::to_string).collect(),
        _ => Vec::new(),
    }
}
