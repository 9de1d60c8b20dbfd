use std::path::Path;

use tracing::info;

use spindle_core::error::Result;
use spindle_core::item::ItemSpec;
use spindle_core::resource::Resource;
use spindle_plan::ExecutionUnit;
use spindle_store::{ParameterDb, ParameterValueRow};

use crate::context::RunContext;

use super::{output_directory_name, ItemOutput};

/// Export every upstream database into `output/<filter-dir>/out.csv`, one
/// `alternative,value` row per parameter value. The `.filter_id` file next
/// to it records the canonical filter-stack string for downstream tooling.
pub fn execute(ctx: &RunContext, spec: &ItemSpec, unit: &ExecutionUnit) -> Result<ItemOutput> {
    let rows = collect_rows(unit)?;

    let out_dir = ctx
        .dirs
        .output_dir(&spec.short_name())
        .join(output_directory_name(&unit.filter_stack));
    std::fs::create_dir_all(&out_dir)?;

    let csv_path = out_dir.join("out.csv");
    write_csv(&csv_path, &rows)?;
    std::fs::write(
        out_dir.join(".filter_id"),
        format!("{}\n", unit.filter_stack.filter_id()),
    )?;

    info!(
        item = %unit.item,
        rows = rows.len(),
        path = %csv_path.display(),
        "Export written"
    );
    Ok(ItemOutput {
        produced: vec![Resource::file(
            &spec.name,
            "out.csv",
            csv_path.display().to_string(),
        )],
        diagnostics: vec![],
    })
}

/// Rows from every upstream database, narrowed to the scenario its filtered
/// view selects.
pub(super) fn collect_rows(unit: &ExecutionUnit) -> Result<Vec<ParameterValueRow>> {
    let mut rows = Vec::new();
    for resource in &unit.resources_from_predecessors {
        if !resource.is_database() {
            continue;
        }
        let db = ParameterDb::create_mapping(&resource.url, false)?;
        rows.extend(db.parameter_value_rows(resource.scenario())?);
    }
    Ok(rows)
}

fn write_csv(path: &Path, rows: &[ParameterValueRow]) -> Result<()> {
    let mut body = String::new();
    for row in rows {
        body.push_str(&format!("{},{}\n", row.alternative, row.value.export_string()));
    }
    std::fs::write(path, body)?;
    Ok(())
}
