use tracing::info;

use spindle_core::error::Result;
use spindle_core::item::ItemSpec;
use spindle_core::resource::Resource;
use spindle_plan::ExecutionUnit;
use spindle_store::ParameterValueRow;

use crate::context::RunContext;

use super::{exporter, output_directory_name, ItemOutput};

/// Like the csv exporter, but through the gdx codec: the value tree is
/// encoded to a byte stream and written as `out.gdx`.
pub fn execute(ctx: &RunContext, spec: &ItemSpec, unit: &ExecutionUnit) -> Result<ItemOutput> {
    let rows = exporter::collect_rows(unit)?;

    let out_dir = ctx
        .dirs
        .output_dir(&spec.short_name())
        .join(output_directory_name(&unit.filter_stack));
    std::fs::create_dir_all(&out_dir)?;

    let gdx_path = out_dir.join("out.gdx");
    std::fs::write(&gdx_path, encode(&rows))?;
    std::fs::write(
        out_dir.join(".filter_id"),
        format!("{}\n", unit.filter_stack.filter_id()),
    )?;

    info!(item = %unit.item, rows = rows.len(), path = %gdx_path.display(), "Gdx export written");
    Ok(ItemOutput {
        produced: vec![Resource::file(
            &spec.name,
            "out.gdx",
            gdx_path.display().to_string(),
        )],
        diagnostics: vec![],
    })
}

/// Pure function from the value tree to the output byte stream. One
/// length-prefixed record per row, symbols in query order.
fn encode(rows: &[ParameterValueRow]) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"GDXv1\n");
    for row in rows {
        let record = format!(
            "{}\x1f{}\x1f{}\x1f{}\x1f{}",
            row.class,
            row.object,
            row.parameter,
            row.alternative,
            row.value.export_string()
        );
        bytes.extend_from_slice(&(record.len() as u32).to_le_bytes());
        bytes.extend_from_slice(record.as_bytes());
    }
    bytes
}
