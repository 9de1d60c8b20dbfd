use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SpindleError};
use crate::filter::FilterKind;
use crate::item::{ItemSpec, ToolSpecification};

/// Name of the per-project data directory.
pub const DATA_DIR: &str = ".spindle";

/// A connection as authored: directed edge plus optional filter map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionDef {
    pub from: String,
    pub to: String,
    /// Enabled filter values per filter kind. Absent kinds pass everything.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<FilterKind, Vec<String>>,
}

impl ConnectionDef {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            filters: BTreeMap::new(),
        }
    }
}

/// The persisted project: items and connections in authoring order, plus the
/// tool specification table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectFile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub items: Vec<ItemSpec>,
    #[serde(default)]
    pub connections: Vec<ConnectionDef>,
    #[serde(default)]
    pub specifications: BTreeMap<String, ToolSpecification>,
}

impl ProjectFile {
    /// Load the project stored under `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = ProjectDirs::new(dir).project_file();
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            SpindleError::Project(format!("cannot read {}: {}", path.display(), e))
        })?;
        let project: ProjectFile = serde_json::from_str(&raw)?;
        debug!(path = %path.display(), items = project.items.len(), "Project loaded");
        Ok(project)
    }

    /// Write the project back under `dir`, creating the data directory.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let dirs = ProjectDirs::new(dir);
        std::fs::create_dir_all(dirs.data_dir())?;
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(dirs.project_file(), raw)?;
        Ok(())
    }

    pub fn specification(&self, name: &str) -> Option<&ToolSpecification> {
        self.specifications.get(name)
    }
}

/// Canonical locations inside a project directory.
#[derive(Debug, Clone)]
pub struct ProjectDirs {
    root: PathBuf,
}

impl ProjectDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    pub fn project_file(&self) -> PathBuf {
        self.data_dir().join("project.json")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.data_dir().join("settings.toml")
    }

    pub fn items_dir(&self) -> PathBuf {
        self.data_dir().join("items")
    }

    /// Per-item working directory, keyed by short name.
    pub fn item_dir(&self, short_name: &str) -> PathBuf {
        self.items_dir().join(short_name)
    }

    /// Root of an item's per-filter output subdirectories.
    pub fn output_dir(&self, short_name: &str) -> PathBuf {
        self.item_dir(short_name).join("output")
    }

    /// Default on-disk database location for a data store.
    pub fn default_database_path(&self, short_name: &str, item_name: &str) -> PathBuf {
        self.item_dir(short_name).join(format!("{}.sqlite", item_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemConfig;

    #[test]
    fn test_project_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = ProjectFile {
            name: "demo".into(),
            ..Default::default()
        };
        project
            .items
            .push(ItemSpec::new("Store", ItemConfig::DataStore { url: None }));
        project
            .items
            .push(ItemSpec::new("Out", ItemConfig::Exporter {}));
        let mut conn = ConnectionDef::new("Store", "Out");
        conn.filters
            .insert(FilterKind::Scenario, vec!["base".into()]);
        project.connections.push(conn);

        project.save(dir.path()).unwrap();
        let loaded = ProjectFile::load(dir.path()).unwrap();
        assert_eq!(loaded.items.len(), 2);
        assert_eq!(loaded.connections.len(), 1);
        assert_eq!(
            loaded.connections[0].filters[&FilterKind::Scenario],
            vec!["base".to_string()]
        );
    }

    #[test]
    fn test_missing_project_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ProjectFile::load(dir.path()).is_err());
    }

    #[test]
    fn test_canonical_paths() {
        let dirs = ProjectDirs::new("/proj");
        assert_eq!(dirs.project_file(), PathBuf::from("/proj/.spindle/project.json"));
        assert_eq!(dirs.item_dir("tool_1"), PathBuf::from("/proj/.spindle/items/tool_1"));
        assert_eq!(
            dirs.default_database_path("store", "Store"),
            PathBuf::from("/proj/.spindle/items/store/Store.sqlite")
        );
    }
}
