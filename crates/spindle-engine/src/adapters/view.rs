use tracing::info;

use spindle_core::error::Result;
use spindle_core::item::ItemSpec;
use spindle_plan::ExecutionUnit;
use spindle_store::ParameterDb;

use super::ItemOutput;

/// A view only observes: it opens each upstream database and reports how
/// many parameter values its (possibly filtered) view exposes.
pub fn execute(spec: &ItemSpec, unit: &ExecutionUnit) -> Result<ItemOutput> {
    let mut diagnostics = Vec::new();
    for resource in unit
        .resources_from_predecessors
        .iter()
        .filter(|r| r.is_database())
    {
        let db = ParameterDb::create_mapping(&resource.url, false)?;
        let rows = db.parameter_value_rows(resource.scenario())?;
        info!(
            item = %spec.name,
            database = %resource.label,
            rows = rows.len(),
            "View refreshed"
        );
        diagnostics.push(format!("{}: {} parameter values", resource.label, rows.len()));
    }
    Ok(ItemOutput {
        produced: vec![],
        diagnostics,
    })
}
