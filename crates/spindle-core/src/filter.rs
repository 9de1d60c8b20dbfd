use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of filter a connection can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Scenario,
    Tool,
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterKind::Scenario => write!(f, "scenario"),
            FilterKind::Tool => write!(f, "tool"),
        }
    }
}

/// One accumulated filter along a path: the enabled value plus the label of
/// the resource it narrows (for scenario filters, the source database label).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterEntry {
    pub kind: FilterKind,
    pub value: String,
    pub label: String,
}

impl FilterEntry {
    pub fn new(kind: FilterKind, value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
            label: label.into(),
        }
    }

    /// Canonical user-visible form, persisted in `.filter_id` files.
    /// Downstream tooling parses this; the format is locked.
    pub fn filter_id(&self) -> String {
        format!("{} - {}", self.value, self.label)
    }
}

/// Ordered filters accumulated from an upstream data source down to the item
/// currently executing. Empty for items with no filtered inbound path.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterStack(Vec<FilterEntry>);

impl FilterStack {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, entry: FilterEntry) {
        self.0.push(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn entries(&self) -> &[FilterEntry] {
        &self.0
    }

    /// Canonical string form: one `"<value> - <label>"` line per entry.
    pub fn filter_id(&self) -> String {
        self.0
            .iter()
            .map(FilterEntry::filter_id)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Directory-safe name keying this stack's output subdirectory:
    /// the filter values joined by underscores.
    pub fn directory_name(&self) -> String {
        let joined = self
            .0
            .iter()
            .map(|e| e.value.as_str())
            .collect::<Vec<_>>()
            .join("_");
        sanitize(&joined)
    }

    /// Ordering key for units of the same item: the canonical string.
    pub fn sort_key(&self) -> String {
        self.filter_id()
    }
}

impl FromIterator<FilterEntry> for FilterStack {
    fn from_iter<I: IntoIterator<Item = FilterEntry>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
