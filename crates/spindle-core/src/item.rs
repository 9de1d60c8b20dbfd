use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpindleError};

/// Kind tag of a project item. Immutable after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    DataStore,
    DataConnection,
    Tool,
    Importer,
    Exporter,
    GdxExport,
    View,
    Merger,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            ItemKind::DataStore => "data_store",
            ItemKind::DataConnection => "data_connection",
            ItemKind::Tool => "tool",
            ItemKind::Importer => "importer",
            ItemKind::Exporter => "exporter",
            ItemKind::GdxExport => "gdx_export",
            ItemKind::View => "view",
            ItemKind::Merger => "merger",
        };
        write!(f, "{}", tag)
    }
}

/// Folder-allocation form of an item name: lowercased, spaces to underscores.
pub fn short_name(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

/// Kind-specific item configuration, tagged by the kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemConfig {
    DataStore {
        /// Database URL; `None` means the default on-disk location under the
        /// item's working directory.
        #[serde(default)]
        url: Option<String>,
    },
    DataConnection {
        /// Existing files this connection hands to its successors.
        #[serde(default)]
        file_references: Vec<String>,
    },
    Tool {
        /// Name of the tool specification to run.
        #[serde(default)]
        specification: Option<String>,
        #[serde(default)]
        cmd_line_args: Vec<String>,
    },
    Importer {
        /// Skip the first row of each input file.
        #[serde(default)]
        skip_header: bool,
    },
    Exporter {},
    GdxExport {},
    View {},
    Merger {},
}

impl ItemConfig {
    pub fn kind(&self) -> ItemKind {
        match self {
            ItemConfig::DataStore { .. } => ItemKind::DataStore,
            ItemConfig::DataConnection { .. } => ItemKind::DataConnection,
            ItemConfig::Tool { .. } => ItemKind::Tool,
            ItemConfig::Importer { .. } => ItemKind::Importer,
            ItemConfig::Exporter {} => ItemKind::Exporter,
            ItemConfig::GdxExport {} => ItemKind::GdxExport,
            ItemConfig::View {} => ItemKind::View,
            ItemConfig::Merger {} => ItemKind::Merger,
        }
    }
}

/// A project item as authored: identity, placement, and configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(flatten)]
    pub config: ItemConfig,
}

impl ItemSpec {
    pub fn new(name: impl Into<String>, config: ItemConfig) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            x: 0.0,
            y: 0.0,
            config,
        }
    }

    pub fn kind(&self) -> ItemKind {
        self.config.kind()
    }

    pub fn short_name(&self) -> String {
        short_name(&self.name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SpindleError::InvalidSpec("item name is empty".into()));
        }
        Ok(())
    }
}

/// A named command template a tool item runs as a child process.
///
/// `args` entries may reference input resources as `{input:<label>}`; the
/// planner resolves these against the resources visible to the unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpecification {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Labels of files the tool writes, advertised downstream as transient
    /// files (globs advertise as patterns).
    #[serde(default)]
    pub output_files: Vec<String>,
}

impl ToolSpecification {
    /// The input label an argument references, if it is an
    /// `{input:<label>}` placeholder.
    pub fn input_placeholder(arg: &str) -> Option<&str> {
        arg.strip_prefix("{input:")?.strip_suffix('}')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("Tool 1"), "tool_1");
        assert_eq!(short_name("Data Store"), "data_store");
        assert_eq!(short_name("already_short"), "already_short");
    }

    #[test]
    fn test_kind_from_config() {
        let spec = ItemSpec::new("Store", ItemConfig::DataStore { url: None });
        assert_eq!(spec.kind(), ItemKind::DataStore);
        assert_eq!(spec.kind().to_string(), "data_store");
    }

    #[test]
    fn test_item_config_roundtrip() {
        let spec = ItemSpec::new(
            "Cruncher",
            ItemConfig::Tool {
                specification: Some("crunch".into()),
                cmd_line_args: vec!["--fast".into()],
            },
        );
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["type"], "tool");
        assert_eq!(json["specification"], "crunch");
        let back: ItemSpec = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), ItemKind::Tool);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let json = serde_json::json!({
            "name": "Mystery",
            "type": "quantum_item"
        });
        assert!(serde_json::from_value::<ItemSpec>(json).is_err());
    }

    #[test]
    fn test_empty_name_invalid() {
        let spec = ItemSpec::new("  ", ItemConfig::View {});
        assert!(spec.validate().is_err());
    }
}
