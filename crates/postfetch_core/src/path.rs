use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::{FormatError, Kwdict, PathSettings, Template};

/// Target location and metadata of one in-flight item.
///
/// `path`, `realpath` and `realdirectory` are derived values: every setter
/// recomputes them from `directory`, `filename` and the base directory, so
/// they never disagree with the segments they were built from.
#[derive(Debug, Clone)]
pub struct PathContext {
    base_directory: PathBuf,
    directory_fmt: Vec<Template>,
    filename_fmt: Template,

    directory: Vec<String>,
    filename: String,
    extension: String,
    path: PathBuf,
    realpath: PathBuf,
    realdirectory: PathBuf,
    temppath: Option<PathBuf>,
    kwdict: Kwdict,
}

impl PathContext {
    pub fn new(settings: &PathSettings) -> Result<Self, FormatError> {
        let directory_fmt = settings
            .directory
            .iter()
            .map(|fmt| Template::parse(fmt))
            .collect::<Result<Vec<_>, _>>()?;
        let filename_fmt = Template::parse(&settings.filename)?;

        let mut ctx = Self {
            base_directory: settings.base_directory.clone(),
            directory_fmt,
            filename_fmt,
            directory: Vec::new(),
            filename: String::new(),
            extension: String::new(),
            path: PathBuf::new(),
            realpath: PathBuf::new(),
            realdirectory: PathBuf::new(),
            temppath: None,
            kwdict: Kwdict::new(),
        };
        ctx.build_path();
        Ok(ctx)
    }

    /// Render the directory templates against `kwdict`.
    pub fn set_directory(&mut self, kwdict: &Kwdict) {
        self.directory = self
            .directory_fmt
            .iter()
            .map(|fmt| sanitize_segment(&fmt.render(kwdict)))
            .filter(|segment| !segment.is_empty())
            .collect();
        self.build_path();
    }

    /// Adopt `kwdict` as the item's metadata and render its filename.
    pub fn set_filename(&mut self, kwdict: Kwdict) {
        self.extension = match kwdict.get("extension") {
            Some(Value::String(ext)) => ext.clone(),
            _ => String::new(),
        };
        self.kwdict = kwdict;
        self.build_filename();
    }

    /// Replace the extension and re-render the filename.
    pub fn set_extension(&mut self, extension: &str) {
        self.extension = extension.to_string();
        self.kwdict
            .insert("extension".to_string(), Value::String(self.extension.clone()));
        self.build_filename();
    }

    /// Use `filename` verbatim instead of the rendered template.
    pub fn set_final_filename(&mut self, filename: impl Into<String>) {
        self.filename = sanitize_segment(&filename.into());
        self.build_path();
    }

    /// Append one or more `/`-separated segments to the directory.
    pub fn append_directory(&mut self, label: &str) {
        self.directory.extend(
            label
                .split('/')
                .map(sanitize_segment)
                .filter(|segment| !segment.is_empty()),
        );
        self.build_path();
    }

    pub fn set_temppath(&mut self, temppath: impl Into<PathBuf>) {
        self.temppath = Some(temppath.into());
    }

    pub fn clear_temppath(&mut self) {
        self.temppath = None;
    }

    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    pub fn directory(&self) -> &[String] {
        &self.directory
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn realpath(&self) -> &Path {
        &self.realpath
    }

    pub fn realdirectory(&self) -> &Path {
        &self.realdirectory
    }

    pub fn temppath(&self) -> Option<&Path> {
        self.temppath.as_deref()
    }

    pub fn kwdict(&self) -> &Kwdict {
        &self.kwdict
    }

    pub fn kwdict_mut(&mut self) -> &mut Kwdict {
        &mut self.kwdict
    }

    fn build_filename(&mut self) {
        self.filename = sanitize_segment(&self.filename_fmt.render(&self.kwdict));
        self.build_path();
    }

    fn build_path(&mut self) {
        let mut directory = self.base_directory.clone();
        directory.extend(&self.directory);

        self.realdirectory = absolute(&directory);
        if self.filename.is_empty() {
            self.path = directory;
            self.realpath = self.realdirectory.clone();
        } else {
            self.path = directory.join(&self.filename);
            self.realpath = self.realdirectory.join(&self.filename);
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Separators and NUL cannot appear inside one segment; `.`/`..` are dropped.
fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim();
    if trimmed == "." || trimmed == ".." {
        String::new()
    } else {
        trimmed.to_string()
    }
}
