use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use globset::Glob;
use serde::{Deserialize, Serialize};

use crate::filter::FilterKind;

/// What a resource points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// The path exists now; safe to read.
    File,
    /// The path does not exist yet but will after its provider executes.
    TransientFile,
    /// A glob over paths; consumers resolve concretely at consumption time.
    FilePattern,
    /// An opaque database URL; consumers open it independently.
    Database,
}

/// An immutable artifact published by an item to its neighbors.
///
/// Resources are value objects: equality is structural, and consumers never
/// mutate one they received. Filtered views are expressed as clones with
/// extra metadata (see `with_filter`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub kind: ResourceKind,
    /// The item that published this resource.
    pub provider: String,
    /// Human-readable tag, unique within the provider.
    pub label: String,
    /// URL for databases, path (or glob) for files.
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

pub const SCENARIO_KEY: &str = "scenario";
pub const TOOL_KEY: &str = "tool";

impl Resource {
    pub fn file(provider: impl Into<String>, label: impl Into<String>, path: impl Into<String>) -> Self {
        Self::make(ResourceKind::File, provider, label, path)
    }

    pub fn transient_file(
        provider: impl Into<String>,
        label: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self::make(ResourceKind::TransientFile, provider, label, path)
    }

    pub fn file_pattern(
        provider: impl Into<String>,
        label: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Self {
        Self::make(ResourceKind::FilePattern, provider, label, pattern)
    }

    pub fn database(provider: impl Into<String>, label: impl Into<String>, url: impl Into<String>) -> Self {
        Self::make(ResourceKind::Database, provider, label, url)
    }

    pub fn make(
        kind: ResourceKind,
        provider: impl Into<String>,
        label: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            provider: provider.into(),
            label: label.into(),
            url: url.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// True only for `File`: the path is known to exist already.
    pub fn is_actual_file(&self) -> bool {
        self.kind == ResourceKind::File
    }

    pub fn is_database(&self) -> bool {
        self.kind == ResourceKind::Database
    }

    /// Filesystem path for file-like resources. Database URLs of the form
    /// `sqlite:///path` also resolve so adapters can reach the backing file.
    pub fn path(&self) -> Option<PathBuf> {
        match self.kind {
            ResourceKind::File | ResourceKind::TransientFile | ResourceKind::FilePattern => {
                Some(PathBuf::from(self.url.strip_prefix("file://").unwrap_or(&self.url)))
            }
            ResourceKind::Database => self
                .url
                .strip_prefix("sqlite:///")
                .map(|p| Path::new("/").join(p)),
        }
    }

    /// Glob match of this resource's path against a `FilePattern` resource.
    pub fn matches(&self, pattern: &Resource) -> bool {
        if pattern.kind != ResourceKind::FilePattern {
            return false;
        }
        let Some(path) = self.path() else { return false };
        match Glob::new(&pattern.url) {
            Ok(glob) => glob.compile_matcher().is_match(&path),
            Err(_) => false,
        }
    }

    /// A filtered view of this resource: same artifact, with the filter
    /// recorded in metadata so the consumer opens it narrowed.
    pub fn with_filter(&self, kind: FilterKind, value: &str) -> Self {
        let mut filtered = self.clone();
        let key = match kind {
            FilterKind::Scenario => SCENARIO_KEY,
            FilterKind::Tool => TOOL_KEY,
        };
        filtered.metadata.insert(key.to_string(), value.to_string());
        filtered
    }

    /// The scenario this view is narrowed to, if any.
    pub fn scenario(&self) -> Option<&str> {
        self.metadata.get(SCENARIO_KEY).map(String::as_str)
    }
}
