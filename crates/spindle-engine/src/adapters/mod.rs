//! Item adapters: one per item kind.
//!
//! Data stores, data connections, importers, exporters, gdx exports, views,
//! and mergers execute in-process on the engine task; tools run as child
//! processes. All adapters share one contract: inputs in, (produced
//! resources, diagnostics) out, errors through `SpindleError`.

pub mod data_connection;
pub mod data_store;
pub mod exporter;
pub mod gdx_export;
pub mod importer;
pub mod merger;
pub mod tool;
pub mod view;

use tracing::debug;

use spindle_core::error::{Result, SpindleError};
use spindle_core::execution::Direction;
use spindle_core::filter::FilterStack;
use spindle_core::item::ItemKind;
use spindle_core::resource::Resource;
use spindle_graph::ProjectModel;
use spindle_plan::ExecutionUnit;

use crate::context::RunContext;

/// What one adapter invocation yields.
#[derive(Debug, Default)]
pub struct ItemOutput {
    pub produced: Vec<Resource>,
    pub diagnostics: Vec<String>,
}

/// Subdirectory name for a unit's outputs. Unfiltered units share one
/// directory; filtered units are keyed by their stack so two stacks never
/// write into the same place.
pub fn output_directory_name(stack: &FilterStack) -> String {
    if stack.is_empty() {
        "unfiltered".to_string()
    } else {
        stack.directory_name()
    }
}

/// Execute one unit with the adapter for its item kind.
pub async fn execute(
    ctx: &RunContext,
    model: &ProjectModel,
    unit: &ExecutionUnit,
) -> Result<ItemOutput> {
    let node = model
        .graph
        .get(&unit.item)
        .ok_or_else(|| SpindleError::UnknownItem(unit.item.clone()))?;

    // Backward passes exist so items can publish results to their
    // predecessors; the engine handles that re-advertisement itself, so no
    // adapter has backward work to do.
    if unit.direction == Direction::Backward {
        debug!(item = %unit.item, "Backward pass");
        return Ok(ItemOutput::default());
    }

    match node.spec.kind() {
        ItemKind::DataStore => data_store::execute(model, &node.spec, unit),
        ItemKind::DataConnection => data_connection::execute(model, &node.spec),
        ItemKind::Importer => importer::execute(&node.spec, unit),
        ItemKind::Exporter => exporter::execute(ctx, &node.spec, unit),
        ItemKind::GdxExport => gdx_export::execute(ctx, &node.spec, unit),
        ItemKind::View => view::execute(&node.spec, unit),
        ItemKind::Merger => merger::execute(&node.spec, unit),
        ItemKind::Tool => tool::execute(ctx, model, &node.spec, unit).await,
    }
}

/// Post-success hook, invoked by the engine once a unit's results are
/// installed.
pub fn handle_execution_successful(model: &ProjectModel, unit: &ExecutionUnit) {
    let Some(node) = model.graph.get(&unit.item) else {
        return;
    };
    match node.spec.kind() {
        ItemKind::DataStore => {
            debug!(item = %unit.item, "Committed state visible to readers")
        }
        ItemKind::Tool => {
            debug!(item = %unit.item, "Tool run archived")
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spindle_core::filter::{FilterEntry, FilterKind};

    #[test]
    fn test_output_directory_name() {
        assert_eq!(output_directory_name(&FilterStack::new()), "unfiltered");
        let stack: FilterStack = [FilterEntry::new(FilterKind::Scenario, "s1", "Data")]
            .into_iter()
            .collect();
        assert_eq!(output_directory_name(&stack), "s1");
    }
}
