use spindle_core::filter::{FilterKind, FilterStack};
use spindle_core::item::ItemKind;
use spindle_core::resource::Resource;
use spindle_graph::ProjectModel;

/// Narrow a resource list through a filter stack.
///
/// Every entry in the stack must admit a resource for it to be delivered:
/// scenario entries re-label the matching database resource so its consumer
/// opens a scenario-filtered view; tool entries drop resources published by
/// any tool other than the named one. Resources a filter does not speak
/// about pass through untouched.
pub fn filtered_view(
    model: &ProjectModel,
    stack: &FilterStack,
    resources: &[Resource],
) -> Vec<Resource> {
    resources
        .iter()
        .filter_map(|resource| admit(model, stack, resource))
        .collect()
}

fn admit(model: &ProjectModel, stack: &FilterStack, resource: &Resource) -> Option<Resource> {
    let mut view = resource.clone();
    for entry in stack.entries() {
        match entry.kind {
            FilterKind::Scenario => {
                if resource.is_database() && resource.label == entry.label {
                    view = view.with_filter(FilterKind::Scenario, &entry.value);
                }
            }
            FilterKind::Tool => {
                let from_tool = model
                    .graph
                    .get(&resource.provider)
                    .map(|node| node.spec.kind() == ItemKind::Tool)
                    .unwrap_or(false);
                if from_tool && resource.provider != entry.value {
                    return None;
                }
            }
        }
    }
    Some(view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spindle_core::filter::FilterEntry;
    use spindle_core::item::{ItemConfig, ItemSpec};
    use spindle_core::project::ProjectDirs;

    fn model() -> ProjectModel {
        let mut model = ProjectModel::new(ProjectDirs::new("/proj"));
        model
            .add_item(ItemSpec::new("Data", ItemConfig::DataStore { url: None }))
            .unwrap();
        model
            .add_item(ItemSpec::new(
                "Cruncher",
                ItemConfig::Tool {
                    specification: None,
                    cmd_line_args: vec![],
                },
            ))
            .unwrap();
        model
    }

    #[test]
    fn test_scenario_entry_narrows_matching_database() {
        let model = model();
        let stack: FilterStack = [FilterEntry::new(FilterKind::Scenario, "high", "Data")]
            .into_iter()
            .collect();
        let db = Resource::database("Data", "Data", "sqlite:///tmp/Data.sqlite");
        let other = Resource::database("Other", "Other", "sqlite:///tmp/Other.sqlite");

        let view = filtered_view(&model, &stack, &[db, other.clone()]);
        assert_eq!(view.len(), 2);
        assert_eq!(view[0].scenario(), Some("high"));
        assert_eq!(view[1], other);
    }

    #[test]
    fn test_tool_entry_drops_other_tools() {
        let mut model = model();
        model
            .add_item(ItemSpec::new(
                "Grinder",
                ItemConfig::Tool {
                    specification: None,
                    cmd_line_args: vec![],
                },
            ))
            .unwrap();
        let stack: FilterStack = [FilterEntry::new(FilterKind::Tool, "Cruncher", "Data")]
            .into_iter()
            .collect();
        let mine = Resource::file("Cruncher", "out.dat", "/tmp/out.dat");
        let theirs = Resource::file("Grinder", "out.dat", "/tmp/other.dat");
        let view = filtered_view(&model, &stack, &[mine.clone(), theirs]);
        assert_eq!(view, vec![mine]);
    }

    #[test]
    fn test_non_tool_resources_pass_tool_filter() {
        let model = model();
        let stack: FilterStack = [FilterEntry::new(FilterKind::Tool, "Cruncher", "Data")]
            .into_iter()
            .collect();
        let file = Resource::file("Data", "data.csv", "/tmp/data.csv");
        let view = filtered_view(&model, &stack, &[file.clone()]);
        assert_eq!(view, vec![file]);
    }

    #[test]
    fn test_empty_stack_passes_everything() {
        let model = model();
        let resources = vec![
            Resource::file("Data", "a", "/a"),
            Resource::database("Data", "Data", "sqlite:///d"),
        ];
        assert_eq!(
            filtered_view(&model, &FilterStack::new(), &resources),
            resources
        );
    }
}
