use tracing::info;

use spindle_core::error::Result;
use spindle_core::item::ItemSpec;
use spindle_plan::ExecutionUnit;
use spindle_store::{ParameterDb, ParameterValue};

use super::ItemOutput;

/// Consolidate every upstream database into every downstream database.
///
/// Sources are read in the order their resources arrived, which is
/// predecessor insertion order, and each source is committed to the sink
/// before the next one is read. Where two sources write the same
/// (class, object, parameter, alternative) key, the later insertion wins.
pub fn execute(spec: &ItemSpec, unit: &ExecutionUnit) -> Result<ItemOutput> {
    let sources: Vec<_> = unit
        .resources_from_predecessors
        .iter()
        .filter(|r| r.is_database())
        .collect();
    let sinks: Vec<_> = unit
        .resources_from_successors
        .iter()
        .filter(|r| r.is_database())
        .collect();

    let mut merged = 0;
    for source in &sources {
        let from = ParameterDb::create_mapping(&source.url, false)?;
        let rows = from.parameter_value_rows(source.scenario())?;
        let scenarios = from.scenarios()?;
        let links = from.scenario_alternative_links()?;

        for sink in &sinks {
            let to = ParameterDb::create_mapping(&sink.url, true)?;
            let mut pending = 0;
            let classes: Vec<&str> = rows.iter().map(|r| r.class.as_str()).collect();
            pending += to.import_object_classes(&classes)?;
            let objects: Vec<(&str, &str)> = rows
                .iter()
                .map(|r| (r.class.as_str(), r.object.as_str()))
                .collect();
            pending += to.import_objects(&objects)?;
            let parameters: Vec<(&str, &str)> = rows
                .iter()
                .map(|r| (r.class.as_str(), r.parameter.as_str()))
                .collect();
            pending += to.import_object_parameters(&parameters)?;
            let alternatives: Vec<&str> = rows.iter().map(|r| r.alternative.as_str()).collect();
            pending += to.import_alternatives(&alternatives)?;
            let values: Vec<(&str, &str, &str, &str, ParameterValue)> = rows
                .iter()
                .map(|r| {
                    (
                        r.class.as_str(),
                        r.object.as_str(),
                        r.parameter.as_str(),
                        r.alternative.as_str(),
                        r.value.clone(),
                    )
                })
                .collect();
            let imported_values = to.import_object_parameter_values(&values)?;
            merged += imported_values;
            pending += imported_values;

            let scenario_names: Vec<&str> = scenarios.iter().map(String::as_str).collect();
            pending += to.import_scenarios(&scenario_names)?;
            let link_refs: Vec<(&str, &str, i64)> = links
                .iter()
                .map(|(s, a, rank)| (s.as_str(), a.as_str(), *rank))
                .collect();
            pending += to.import_scenario_alternatives(&link_refs)?;

            if pending > 0 {
                to.commit_session(&format!("Merged content from {}", source.provider))?;
            }
        }
    }

    info!(
        item = %unit.item,
        sources = sources.len(),
        sinks = sinks.len(),
        merged,
        "Merge finished"
    );
    Ok(ItemOutput {
        produced: vec![],
        diagnostics: vec![format!("merged {} sources into {} sinks", sources.len(), sinks.len())],
    })
}
