use std::collections::BTreeMap;
use std::path::Path;

use tracing::info;

use spindle_core::error::Result;
use spindle_core::filter::FilterKind;
use spindle_core::item::{ItemSpec, ToolSpecification};
use spindle_core::project::{ProjectDirs, ProjectFile};
use spindle_core::resource::Resource;

use crate::advertise::Advertiser;
use crate::graph::ProjectGraph;
use crate::propagator::ResourcePropagator;

/// The authored project held in memory: graph and propagator kept in
/// lock-step. Every mutation updates the graph first, then runs the
/// propagator handler to completion, so the resource maps never lag.
pub struct ProjectModel {
    pub graph: ProjectGraph,
    pub propagator: ResourcePropagator,
    dirs: ProjectDirs,
    specifications: BTreeMap<String, ToolSpecification>,
}

impl ProjectModel {
    pub fn new(dirs: ProjectDirs) -> Self {
        Self {
            graph: ProjectGraph::new(),
            propagator: ResourcePropagator::new(),
            dirs,
            specifications: BTreeMap::new(),
        }
    }

    /// Build the model from a persisted project: items in authoring order,
    /// then connections in authoring order.
    pub fn from_project_file(project: &ProjectFile, root: &Path) -> Result<Self> {
        let mut model = Self::new(ProjectDirs::new(root));
        model.specifications = project.specifications.clone();
        for item in &project.items {
            model.add_item(item.clone())?;
        }
        for conn in &project.connections {
            model.connect(&conn.from, &conn.to, Some(conn.filters.clone()))?;
        }
        info!(
            items = model.graph.len(),
            connections = project.connections.len(),
            "Project model assembled"
        );
        Ok(model)
    }

    pub fn dirs(&self) -> &ProjectDirs {
        &self.dirs
    }

    pub fn specifications(&self) -> &BTreeMap<String, ToolSpecification> {
        &self.specifications
    }

    pub fn add_item(&mut self, spec: ItemSpec) -> Result<()> {
        let advertiser = Advertiser::new(&self.dirs, &self.specifications);
        let succ = advertiser.resources_for_direct_successors(&spec);
        let pred = advertiser.resources_for_direct_predecessors(&spec);
        let name = spec.name.clone();
        self.graph.add_item(spec)?;
        self.propagator.on_item_added(&name, succ, pred);
        Ok(())
    }

    pub fn remove_item(&mut self, name: &str) -> Result<ItemSpec> {
        let (spec, removed) = self.graph.remove_item(name)?;
        self.propagator.on_item_removed(&self.graph, name, &removed);
        Ok(spec)
    }

    pub fn connect(
        &mut self,
        src: &str,
        dst: &str,
        filters: Option<BTreeMap<FilterKind, Vec<String>>>,
    ) -> Result<()> {
        self.graph.connect(src, dst, filters)?;
        self.propagator.on_connection_added(src, dst);
        Ok(())
    }

    pub fn disconnect(&mut self, src: &str, dst: &str) -> Result<()> {
        self.graph.disconnect(src, dst)?;
        self.propagator.on_connection_removed(&self.graph, src, dst);
        Ok(())
    }

    pub fn set_filter(
        &mut self,
        src: &str,
        dst: &str,
        kind: FilterKind,
        values: Vec<String>,
    ) -> Result<()> {
        self.graph.set_filter(src, dst, kind, values)
    }

    /// Execution produced concrete resources for an item; refresh what it
    /// advertises and re-propagate to its neighbors.
    pub fn refresh_outputs(
        &mut self,
        name: &str,
        new_successors: Vec<Resource>,
        new_predecessors: Vec<Resource>,
    ) {
        self.propagator
            .on_item_output_changed(&self.graph, name, new_successors, new_predecessors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spindle_core::item::ItemConfig;
    use spindle_core::project::ConnectionDef;

    fn model_with(items: &[(&str, ItemConfig)]) -> ProjectModel {
        let mut model = ProjectModel::new(ProjectDirs::new("/proj"));
        for (name, config) in items {
            model.add_item(ItemSpec::new(*name, config.clone())).unwrap();
        }
        model
    }

    #[test]
    fn test_mutations_keep_maps_current() {
        let mut model = model_with(&[
            ("Store", ItemConfig::DataStore { url: None }),
            ("Out", ItemConfig::Exporter {}),
        ]);
        model.connect("Store", "Out", None).unwrap();
        assert_eq!(model.propagator.upstream_resources("Out").len(), 1);
        model.disconnect("Store", "Out").unwrap();
        assert!(model.propagator.upstream_resources("Out").is_empty());
        model.propagator.check_invariants(&model.graph).unwrap();
    }

    #[test]
    fn test_from_project_file() {
        let mut project = ProjectFile::default();
        project
            .items
            .push(ItemSpec::new("Data", ItemConfig::DataStore { url: None }));
        project.items.push(ItemSpec::new("Out", ItemConfig::Exporter {}));
        project.connections.push(ConnectionDef::new("Data", "Out"));

        let model = ProjectModel::from_project_file(&project, Path::new("/proj")).unwrap();
        assert_eq!(model.graph.len(), 2);
        let upstream = model.propagator.upstream_resources("Out");
        assert_eq!(upstream.len(), 1);
        assert_eq!(upstream[0].label, "Data");
    }

    #[test]
    fn test_bad_connection_propagates_error() {
        let mut project = ProjectFile::default();
        project
            .items
            .push(ItemSpec::new("Data", ItemConfig::DataStore { url: None }));
        project
            .connections
            .push(ConnectionDef::new("Data", "Missing"));
        assert!(ProjectModel::from_project_file(&project, Path::new("/proj")).is_err());
    }
}
