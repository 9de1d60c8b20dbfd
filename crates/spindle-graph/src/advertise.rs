use std::collections::BTreeMap;

use spindle_core::item::{ItemConfig, ItemSpec, ToolSpecification};
use spindle_core::project::ProjectDirs;
use spindle_core::resource::Resource;

/// Pure queries computing what an item advertises to its neighbors.
///
/// Advertisement never inspects the graph or the propagator maps — only the
/// item's own state — so resource notifications cannot re-enter propagation.
/// Advertised files need not exist yet; transient and pattern kinds say so.
pub struct Advertiser<'a> {
    dirs: &'a ProjectDirs,
    specifications: &'a BTreeMap<String, ToolSpecification>,
}

impl<'a> Advertiser<'a> {
    pub fn new(
        dirs: &'a ProjectDirs,
        specifications: &'a BTreeMap<String, ToolSpecification>,
    ) -> Self {
        Self {
            dirs,
            specifications,
        }
    }

    /// The database URL a data store serves, honoring an explicit URL in the
    /// item configuration and defaulting to the on-disk location otherwise.
    pub fn database_url(&self, spec: &ItemSpec) -> Option<String> {
        match &spec.config {
            ItemConfig::DataStore { url: Some(url) } => Some(url.clone()),
            ItemConfig::DataStore { url: None } => {
                let path = self
                    .dirs
                    .default_database_path(&spec.short_name(), &spec.name);
                Some(format!("sqlite://{}", path.display()))
            }
            _ => None,
        }
    }

    /// Resources the item makes available to direct successors.
    pub fn resources_for_direct_successors(&self, spec: &ItemSpec) -> Vec<Resource> {
        match &spec.config {
            ItemConfig::DataStore { .. } => {
                let url = self.database_url(spec).unwrap_or_default();
                vec![Resource::database(&spec.name, &spec.name, url)]
            }
            ItemConfig::DataConnection { file_references } => file_references
                .iter()
                .map(|path| {
                    let label = file_name_label(path);
                    Resource::file(&spec.name, label, path.clone())
                })
                .collect(),
            ItemConfig::Tool { specification, .. } => {
                let Some(tool_spec) = specification
                    .as_deref()
                    .and_then(|name| self.specifications.get(name))
                else {
                    return vec![];
                };
                let work_dir = self.dirs.item_dir(&spec.short_name());
                tool_spec
                    .output_files
                    .iter()
                    .map(|label| {
                        let path = work_dir.join(label).display().to_string();
                        if label.contains('*') {
                            Resource::file_pattern(&spec.name, label.clone(), path)
                        } else {
                            Resource::transient_file(&spec.name, label.clone(), path)
                        }
                    })
                    .collect()
            }
            // Importers, exporters, views, and mergers produce artifacts at
            // execution time; they advertise nothing up front.
            _ => vec![],
        }
    }

    /// Resources the item makes available to direct predecessors. Data
    /// stores expose their database upstream so tools and mergers can write
    /// into it; nothing else advertises backwards.
    pub fn resources_for_direct_predecessors(&self, spec: &ItemSpec) -> Vec<Resource> {
        match &spec.config {
            ItemConfig::DataStore { .. } => self.resources_for_direct_successors(spec),
            _ => vec![],
        }
    }
}

fn file_name_label(path: &str) -> String {
    std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use spindle_core::resource::ResourceKind;

    fn advertiser_fixture(
        specs: &BTreeMap<String, ToolSpecification>,
        dirs: &ProjectDirs,
    ) -> Vec<Resource> {
        let adv = Advertiser::new(dirs, specs);
        let item = ItemSpec::new(
            "Cruncher",
            ItemConfig::Tool {
                specification: Some("crunch".into()),
                cmd_line_args: vec![],
            },
        );
        adv.resources_for_direct_successors(&item)
    }

    #[test]
    fn test_data_store_advertises_both_directions() {
        let dirs = ProjectDirs::new("/proj");
        let specs = BTreeMap::new();
        let adv = Advertiser::new(&dirs, &specs);
        let item = ItemSpec::new("My Store", ItemConfig::DataStore { url: None });
        let down = adv.resources_for_direct_successors(&item);
        let up = adv.resources_for_direct_predecessors(&item);
        assert_eq!(down, up);
        assert_eq!(down.len(), 1);
        assert_eq!(down[0].kind, ResourceKind::Database);
        assert_eq!(down[0].label, "My Store");
        assert_eq!(
            down[0].url,
            "sqlite:///proj/.spindle/items/my_store/My Store.sqlite"
        );
    }

    #[test]
    fn test_tool_outputs_transient_or_pattern() {
        let dirs = ProjectDirs::new("/proj");
        let mut specs = BTreeMap::new();
        specs.insert(
            "crunch".to_string(),
            ToolSpecification {
                program: "python".into(),
                args: vec![],
                output_files: vec!["result.dat".into(), "logs/*.log".into()],
            },
        );
        let resources = advertiser_fixture(&specs, &dirs);
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].kind, ResourceKind::TransientFile);
        assert_eq!(resources[1].kind, ResourceKind::FilePattern);
        assert!(resources[0].url.ends_with("items/cruncher/result.dat"));
    }

    #[test]
    fn test_tool_without_specification_advertises_nothing() {
        let dirs = ProjectDirs::new("/proj");
        let specs = BTreeMap::new();
        assert!(advertiser_fixture(&specs, &dirs).is_empty());
    }

    #[test]
    fn test_data_connection_file_references() {
        let dirs = ProjectDirs::new("/proj");
        let specs = BTreeMap::new();
        let adv = Advertiser::new(&dirs, &specs);
        let item = ItemSpec::new(
            "Files",
            ItemConfig::DataConnection {
                file_references: vec!["/data/input.csv".into()],
            },
        );
        let resources = adv.resources_for_direct_successors(&item);
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].label, "input.csv");
        assert!(resources[0].is_actual_file());
        assert!(adv.resources_for_direct_predecessors(&item).is_empty());
    }
}
