use tracing::debug;

use spindle_core::error::{Result, SpindleError};
use spindle_core::item::ItemSpec;
use spindle_graph::ProjectModel;
use spindle_plan::ExecutionUnit;
use spindle_store::ParameterDb;

use super::ItemOutput;

/// A data store's forward pass makes sure the database behind its
/// advertised URL exists with the schema installed, so every consumer can
/// open it without racing on creation.
pub fn execute(model: &ProjectModel, spec: &ItemSpec, unit: &ExecutionUnit) -> Result<ItemOutput> {
    let url = model
        .propagator
        .advertised_to_successors(&spec.name)
        .iter()
        .find(|r| r.is_database())
        .map(|r| r.url.clone())
        .ok_or_else(|| {
            SpindleError::InternalInvariant(format!("data store {} advertises no database", spec.name))
        })?;
    ParameterDb::create_mapping(&url, true)?;
    debug!(item = %unit.item, url = %url, "Data store ready");
    Ok(ItemOutput::default())
}
