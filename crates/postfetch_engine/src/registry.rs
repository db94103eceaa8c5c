use std::collections::HashMap;
use std::fmt;

use postfetch_logging::pipeline_debug;
use serde_json::Value;
use thiserror::Error;

use crate::archive::ArchivePostprocessor;
use crate::classify::ClassifyPostprocessor;
use crate::metadata::MetadataPostprocessor;
use crate::mtime::MtimePostprocessor;
use crate::Constructor;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("failed to load plugin category {category}: {message}")]
    Load { category: String, message: String },
}

/// A resolved plugin: its category, exported symbol and constructor.
#[derive(Clone, Copy)]
pub struct PluginEntry {
    category: &'static str,
    symbol: &'static str,
    constructor: Constructor,
}

impl PluginEntry {
    pub const fn new(category: &'static str, symbol: &'static str, constructor: Constructor) -> Self {
        Self {
            category,
            symbol,
            constructor,
        }
    }

    pub fn category(&self) -> &'static str {
        self.category
    }

    pub fn symbol(&self) -> &'static str {
        self.symbol
    }

    pub fn constructor(&self) -> Constructor {
        self.constructor
    }
}

impl fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginEntry")
            .field("category", &self.category)
            .field("symbol", &self.symbol)
            .finish_non_exhaustive()
    }
}

/// Looks up a plugin category and the symbol it is expected to export.
pub trait Resolver {
    /// `Ok(None)` means the category or symbol does not exist.
    fn resolve(&self, category: &str, symbol: &str) -> Result<Option<PluginEntry>, ResolveError>;

    /// All categories this resolver knows about.
    fn categories(&self) -> Vec<&'static str>;
}

/// Compile-time table of the built-in postprocessors.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticResolver;

const BUILTIN: &[PluginEntry] = &[
    PluginEntry::new("classify", "ClassifyPP", ClassifyPostprocessor::construct),
    PluginEntry::new("metadata", "MetadataPP", MetadataPostprocessor::construct),
    PluginEntry::new("mtime", "MtimePP", MtimePostprocessor::construct),
    PluginEntry::new("zip", "ZipPP", ArchivePostprocessor::construct),
];

impl Resolver for StaticResolver {
    fn resolve(&self, category: &str, symbol: &str) -> Result<Option<PluginEntry>, ResolveError> {
        Ok(BUILTIN
            .iter()
            .find(|entry| entry.category == category && entry.symbol == symbol)
            .copied())
    }

    fn categories(&self) -> Vec<&'static str> {
        BUILTIN.iter().map(|entry| entry.category).collect()
    }
}

/// Maps category names to plugin constructors, resolving each name once.
///
/// Misses are cached as well, so an unknown name is also resolved only once
/// until [`PluginRegistry::reset`] is called.
pub struct PluginRegistry<R = StaticResolver> {
    resolver: R,
    cache: HashMap<String, Option<PluginEntry>>,
}

impl PluginRegistry<StaticResolver> {
    pub fn new() -> Self {
        Self::with_resolver(StaticResolver)
    }
}

impl Default for PluginRegistry<StaticResolver> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Resolver> PluginRegistry<R> {
    pub fn with_resolver(resolver: R) -> Self {
        Self {
            resolver,
            cache: HashMap::new(),
        }
    }

    pub fn find(&mut self, name: &str) -> Option<PluginEntry> {
        if let Some(cached) = self.cache.get(name) {
            return *cached;
        }

        let symbol = symbol_for(name);
        let entry = match self.resolver.resolve(name, &symbol) {
            Ok(entry) => entry,
            Err(err) => {
                pipeline_debug!("Plugin resolution failed for {:?}: {}", name, err);
                None
            }
        };
        self.cache.insert(name.to_string(), entry);
        entry
    }

    /// Like [`find`](Self::find), for names taken from configuration; non-strings never match.
    pub fn find_value(&mut self, name: Option<&Value>) -> Option<PluginEntry> {
        match name {
            Some(Value::String(name)) => self.find(name),
            _ => None,
        }
    }

    pub fn modules(&self) -> Vec<&'static str> {
        self.resolver.categories()
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Forget every cached lookup.
    pub fn reset(&mut self) {
        self.cache.clear();
    }
}

/// `"zip"` -> `"ZipPP"`.
fn symbol_for(category: &str) -> String {
    let mut chars = category.chars();
    let mut symbol = String::with_capacity(category.len() + 2);
    if let Some(first) = chars.next() {
        symbol.extend(first.to_uppercase());
        symbol.push_str(&chars.as_str().to_lowercase());
    }
    symbol.push_str("PP");
    symbol
}
