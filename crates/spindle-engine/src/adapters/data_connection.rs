use spindle_core::error::{Result, SpindleError};
use spindle_core::item::ItemSpec;
use spindle_graph::ProjectModel;

use super::ItemOutput;

/// A data connection hands its file references to successors. The forward
/// pass checks they exist: a reference the user pointed at a missing file
/// fails here, not in whatever consumes it later.
pub fn execute(model: &ProjectModel, spec: &ItemSpec) -> Result<ItemOutput> {
    let advertised = model
        .propagator
        .advertised_to_successors(&spec.name)
        .to_vec();
    for resource in &advertised {
        let Some(path) = resource.path() else { continue };
        if !path.exists() {
            return Err(SpindleError::FileNotFound {
                label: resource.label.clone(),
                path: path.display().to_string(),
            });
        }
    }
    Ok(ItemOutput {
        produced: advertised,
        diagnostics: vec![],
    })
}
