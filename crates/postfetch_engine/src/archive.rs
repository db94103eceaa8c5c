//! Zip container accumulating the files of one directory context.
//!
//! The name table mirrors the entries durably present in the container and
//! is only extended after a successful write, so re-processing an item that
//! is already archived (e.g. after a restart) is a no-op.
//!
//! Two durability modes exist. `default` keeps one writer open for the
//! whole job and preloads the name table from an existing container.
//! `safe` reopens the container in append mode for every item and writes
//! the central directory before returning, so an interruption loses at
//! most the write in flight.
//!
//! Every entry reaches the container with a complete local header. A
//! container whose central directory was never written (the job died
//! before `finalize`) is rebuilt from those headers when it is reopened.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use postfetch_core::{PathContext, PluginOptions};
use tempfile::NamedTempFile;
use postfetch_logging::{pipeline_debug, pipeline_error, pipeline_info, pipeline_warn};
use serde::Deserialize;
use thiserror::Error;
use zip::read::read_zipfile_from_stream;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::{Postprocessor, PostprocessorError};

const NAME: &str = "zip";

const LOCAL_HEADER_MAGIC: &[u8; 4] = b"PK\x03\x04";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] ZipError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Store,
    #[serde(alias = "zip", alias = "deflated")]
    Deflate,
}

impl Compression {
    fn method(self) -> CompressionMethod {
        match self {
            Compression::Store => CompressionMethod::Stored,
            Compression::Deflate => CompressionMethod::Deflated,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ModeOption {
    #[default]
    Default,
    Safe,
}

#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
struct ArchiveOptions {
    compression: Compression,
    extension: String,
    keep_files: bool,
    mode: ModeOption,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            compression: Compression::Store,
            extension: "zip".to_string(),
            keep_files: false,
            mode: ModeOption::Default,
        }
    }
}

/// How the container is held between items.
enum Container {
    /// One writer for the plugin's lifetime; `None` once finalized.
    Held(Option<ZipWriter<File>>),
    /// Reopened in append mode for every write.
    Safe,
}

/// Entry name -> uncompressed size.
type NameTable = HashMap<String, u64>;

/// Folds each item's file into one zip container per directory context.
pub struct ArchivePostprocessor {
    path: PathBuf,
    compression: Compression,
    delete: bool,
    container: Container,
    names: NameTable,
    broken: bool,
}

impl ArchivePostprocessor {
    pub fn new(ctx: &PathContext, options: &PluginOptions) -> Result<Self, PostprocessorError> {
        let options: ArchiveOptions = options
            .parse()
            .map_err(|source| PostprocessorError::InvalidOptions { plugin: NAME, source })?;

        let path = container_path(ctx.realdirectory(), &options.extension);
        let (container, names) = match options.mode {
            ModeOption::Default => {
                let (writer, names) = open_container(&path).map_err(|source| {
                    PostprocessorError::ArchiveOpen {
                        path: path.clone(),
                        source,
                    }
                })?;
                (Container::Held(Some(writer)), names)
            }
            ModeOption::Safe => {
                let names = read_names(&path).map_err(|source| PostprocessorError::ArchiveOpen {
                    path: path.clone(),
                    source,
                })?;
                (Container::Safe, names)
            }
        };

        pipeline_info!(
            "Archiving into {:?} ({} existing entries, {:?} mode)",
            path,
            names.len(),
            options.mode
        );

        Ok(Self {
            path,
            compression: options.compression,
            delete: !options.keep_files,
            container,
            names,
            broken: false,
        })
    }

    pub(crate) fn construct(
        ctx: &PathContext,
        options: &PluginOptions,
    ) -> Result<Box<dyn Postprocessor>, PostprocessorError> {
        Ok(Box::new(Self::new(ctx, options)?))
    }

    /// Location of the container on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn deletes_files(&self) -> bool {
        self.delete
    }

    pub fn is_safe_mode(&self) -> bool {
        matches!(self.container, Container::Safe)
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Whether `name` is durably present in the container.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Number of entries in the name table.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn skip_duplicate(&self, name: &str, source: &Path) -> bool {
        let Some(stored) = self.names.get(name) else {
            return false;
        };
        match fs::metadata(source) {
            Ok(meta) if meta.len() != *stored => pipeline_warn!(
                "Dropping {:?}: {:?} already holds an entry of that name with different size ({} vs {} bytes)",
                source,
                self.path,
                stored,
                meta.len()
            ),
            _ => pipeline_debug!("{:?} already archived in {:?}", name, self.path),
        }
        true
    }

    /// Returns `false` when safe mode finds the entry already present.
    fn write(&mut self, name: &str, source: &Path) -> Result<bool, PostprocessorError> {
        let mut input = File::open(source).map_err(|err| PostprocessorError::ArchiveSource {
            path: source.to_path_buf(),
            source: err,
        })?;
        let size = input
            .metadata()
            .map_err(|err| PostprocessorError::ArchiveSource {
                path: source.to_path_buf(),
                source: err,
            })?
            .len();
        let options = SimpleFileOptions::default()
            .compression_method(self.compression.method())
            .large_file(size > u64::from(u32::MAX));

        let result = match &mut self.container {
            Container::Held(Some(writer)) => write_entry(writer, name, &mut input, options),
            Container::Held(None) => return Err(PostprocessorError::Broken { plugin: NAME }),
            Container::Safe => {
                write_entry_safe(&self.path, &mut self.names, name, &mut input, options)
            }
        };

        match result {
            Ok(true) => {
                self.names.insert(name.to_string(), size);
                Ok(true)
            }
            Ok(false) => {
                pipeline_debug!("{:?} already archived in {:?}", name, self.path);
                Ok(false)
            }
            Err(source) => Err(self.mark_broken(name, source)),
        }
    }

    /// Reload the name table from disk; other writers may share a safe-mode container.
    fn refresh_names(&mut self, name: &str) -> Result<(), PostprocessorError> {
        match read_names(&self.path) {
            Ok(names) => {
                self.names = names;
                Ok(())
            }
            Err(source) => Err(self.mark_broken(name, source)),
        }
    }

    fn mark_broken(&mut self, name: &str, source: ArchiveError) -> PostprocessorError {
        self.broken = true;
        pipeline_error!(
            "Archive {:?} is unusable after failing to write {:?}: {}",
            self.path,
            name,
            source
        );
        PostprocessorError::ArchiveWrite {
            path: self.path.clone(),
            entry: name.to_string(),
            source,
        }
    }
}

impl Postprocessor for ArchivePostprocessor {
    fn name(&self) -> &'static str {
        NAME
    }

    fn run(&mut self, ctx: &mut PathContext) -> Result<(), PostprocessorError> {
        if self.broken {
            return Err(PostprocessorError::Broken { plugin: NAME });
        }

        let name = ctx.filename().to_string();
        let source = ctx
            .temppath()
            .unwrap_or_else(|| ctx.realpath())
            .to_path_buf();

        if self.is_safe_mode() {
            self.refresh_names(&name)?;
        }
        if self.skip_duplicate(&name, &source) {
            return Ok(());
        }
        if !self.write(&name, &source)? {
            return Ok(());
        }

        if self.delete {
            match fs::remove_file(&source) {
                Ok(()) => ctx.clear_temppath(),
                Err(err) => pipeline_warn!("Failed to remove archived file {:?}: {}", source, err),
            }
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), PostprocessorError> {
        let Container::Held(writer) = &mut self.container else {
            return Ok(());
        };
        let Some(writer) = writer.take() else {
            return Ok(());
        };
        if let Err(source) = close(writer) {
            self.broken = true;
            return Err(PostprocessorError::ArchiveClose {
                path: self.path.clone(),
                source,
            });
        }
        pipeline_info!("Closed {:?} with {} entries", self.path, self.names.len());
        Ok(())
    }
}

/// `<parent>/<dirname>.<extension>` for the given real directory.
fn container_path(realdirectory: &Path, extension: &str) -> PathBuf {
    let stem = realdirectory
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string());
    let parent = realdirectory.parent().unwrap_or(realdirectory);
    parent.join(format!("{stem}.{extension}"))
}

/// Open (or create) the container for appending and list its entries.
fn open_container(path: &Path) -> Result<(ZipWriter<File>, NameTable), ArchiveError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let names = read_names(path)?;
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;

    if file.metadata()?.len() == 0 {
        return Ok((ZipWriter::new(file), names));
    }
    let writer = ZipWriter::new_append(file)?;
    Ok((writer, names))
}

/// Entries of an existing container; an absent file has none. An
/// unfinished container is rebuilt first.
fn read_names(path: &Path) -> Result<NameTable, ArchiveError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(NameTable::new()),
        Err(err) => return Err(err.into()),
    };
    if file.metadata()?.len() == 0 {
        return Ok(NameTable::new());
    }
    match list_entries(&file) {
        Err(ArchiveError::Zip(cause @ ZipError::InvalidArchive(_))) => {
            drop(file);
            rebuild(path, cause)
        }
        result => result,
    }
}

/// Rewrite a container that lacks its central directory from its local
/// headers, keeping the leading run of entries whose data is intact.
fn rebuild(path: &Path, cause: ZipError) -> Result<NameTable, ArchiveError> {
    let complete = scan_complete(path)?;
    if complete.is_empty() && !starts_with_local_header(path)? {
        return Err(cause.into());
    }
    pipeline_warn!(
        "Rebuilding unfinished archive {:?} from {} complete entries ({})",
        path,
        complete.len(),
        cause
    );

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut writer = ZipWriter::new(NamedTempFile::new_in(parent)?);
    let mut reader = BufReader::new(File::open(path)?);
    for _ in 0..complete.len() {
        let Some(entry) = read_zipfile_from_stream(&mut reader)? else {
            break;
        };
        writer.raw_copy_file(entry)?;
    }
    let rebuilt = writer.finish()?;
    rebuilt.as_file().sync_all()?;
    rebuilt.persist(path).map_err(|err| ArchiveError::Io(err.error))?;

    Ok(complete.into_iter().collect())
}

/// Names and sizes of the entries that read back with a matching checksum.
fn scan_complete(path: &Path) -> Result<Vec<(String, u64)>, ArchiveError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut complete = Vec::new();
    while let Ok(Some(mut entry)) = read_zipfile_from_stream(&mut reader) {
        let name = entry.name().to_string();
        let size = entry.size();
        if io::copy(&mut entry, &mut io::sink()).is_err() {
            break;
        }
        complete.push((name, size));
    }
    Ok(complete)
}

fn starts_with_local_header(path: &Path) -> io::Result<bool> {
    let mut magic = [0u8; 4];
    match File::open(path)?.read_exact(&mut magic) {
        Ok(()) => Ok(&magic == LOCAL_HEADER_MAGIC),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(err) => Err(err),
    }
}

fn list_entries(file: &File) -> Result<NameTable, ArchiveError> {
    let mut archive = ZipArchive::new(file)?;
    let mut names = NameTable::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index)?;
        names.insert(entry.name().to_string(), entry.size());
    }
    Ok(names)
}

/// The entry is compressed into a scratch archive and raw-copied, so its
/// local header carries final sizes and checksum as soon as this returns.
fn write_entry(
    writer: &mut ZipWriter<File>,
    name: &str,
    input: &mut File,
    options: SimpleFileOptions,
) -> Result<bool, ArchiveError> {
    let mut scratch = ZipWriter::new(tempfile::tempfile()?);
    scratch.start_file(name, options)?;
    io::copy(input, &mut scratch)?;
    let mut staged = ZipArchive::new(scratch.finish()?)?;
    writer.raw_copy_file(staged.by_index(0)?)?;
    writer.flush()?;
    Ok(true)
}

/// Returns `Ok(false)` if the container already holds `name`.
fn write_entry_safe(
    path: &Path,
    names: &mut NameTable,
    name: &str,
    input: &mut File,
    options: SimpleFileOptions,
) -> Result<bool, ArchiveError> {
    let (mut writer, on_disk) = open_container(path)?;
    *names = on_disk;
    if names.contains_key(name) {
        close(writer)?;
        return Ok(false);
    }
    write_entry(&mut writer, name, input, options)?;
    close(writer)?;
    Ok(true)
}

/// Write the central directory and flush the container to disk.
fn close(writer: ZipWriter<File>) -> Result<(), ArchiveError> {
    writer.finish()?.sync_all()?;
    Ok(())
}
