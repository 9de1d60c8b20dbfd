use tracing::info;

use spindle_core::error::{Result, SpindleError};
use spindle_core::item::{ItemConfig, ItemSpec};
use spindle_plan::ExecutionUnit;
use spindle_store::{ParameterDb, ParameterValue};

use super::ItemOutput;

/// Import upstream files into every downstream database.
///
/// Input files are comma-separated rows of
/// `class,object,parameter,alternative,value`; each file is imported in
/// full, then the session is committed once per target database.
pub fn execute(spec: &ItemSpec, unit: &ExecutionUnit) -> Result<ItemOutput> {
    let skip_header = matches!(&spec.config, ItemConfig::Importer { skip_header: true });

    let mut rows: Vec<ImportRow> = Vec::new();
    for resource in &unit.resources_from_predecessors {
        let Some(path) = resource.path() else { continue };
        if resource.is_database() {
            continue;
        }
        if !path.exists() {
            return Err(SpindleError::FileNotFound {
                label: resource.label.clone(),
                path: path.display().to_string(),
            });
        }
        let body = std::fs::read_to_string(&path)?;
        rows.extend(parse_rows(&body, skip_header)?);
    }

    let mut imported_total = 0;
    if !rows.is_empty() {
        for target in unit.resources_from_successors.iter().filter(|r| r.is_database()) {
            let db = ParameterDb::create_mapping(&target.url, true)?;
            imported_total += import_rows(&db, &rows)?;
            db.commit_session(&format!("Import by {}", spec.name))?;
        }
    }

    info!(item = %unit.item, rows = rows.len(), imported = imported_total, "Import finished");
    Ok(ItemOutput {
        produced: vec![],
        diagnostics: vec![format!("imported {} rows", rows.len())],
    })
}

struct ImportRow {
    class: String,
    object: String,
    parameter: String,
    alternative: String,
    value: ParameterValue,
}

fn parse_rows(body: &str, skip_header: bool) -> Result<Vec<ImportRow>> {
    let mut rows = Vec::new();
    for (index, line) in body.lines().enumerate() {
        if skip_header && index == 0 {
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 5 {
            return Err(SpindleError::Project(format!(
                "malformed import row {}: expected 5 fields, got {}",
                index + 1,
                fields.len()
            )));
        }
        rows.push(ImportRow {
            class: fields[0].to_string(),
            object: fields[1].to_string(),
            parameter: fields[2].to_string(),
            alternative: fields[3].to_string(),
            value: parse_value(fields[4]),
        });
    }
    Ok(rows)
}

fn parse_value(field: &str) -> ParameterValue {
    if let Ok(v) = field.parse::<f64>() {
        return ParameterValue::Float(v);
    }
    match field {
        "true" => ParameterValue::Bool(true),
        "false" => ParameterValue::Bool(false),
        other => ParameterValue::Str(other.to_string()),
    }
}

fn import_rows(db: &ParameterDb, rows: &[ImportRow]) -> Result<usize> {
    let classes: Vec<&str> = rows.iter().map(|r| r.class.as_str()).collect();
    db.import_object_classes(&classes)?;
    let objects: Vec<(&str, &str)> = rows
        .iter()
        .map(|r| (r.class.as_str(), r.object.as_str()))
        .collect();
    db.import_objects(&objects)?;
    let parameters: Vec<(&str, &str)> = rows
        .iter()
        .map(|r| (r.class.as_str(), r.parameter.as_str()))
        .collect();
    db.import_object_parameters(&parameters)?;
    let alternatives: Vec<&str> = rows.iter().map(|r| r.alternative.as_str()).collect();
    db.import_alternatives(&alternatives)?;
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
    db.import_object_parameter_values(&values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rows() {
        let body = "Widget,spoon,volume,Base,1.0\nWidget,fork,volume,Base,tiny\n";
        let rows = parse_rows(body, false).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value, ParameterValue::Float(1.0));
        assert_eq!(rows[1].value, ParameterValue::Str("tiny".into()));
    }

    #[test]
    fn test_skip_header() {
        let body = "class,object,parameter,alternative,value\nWidget,spoon,volume,Base,1.0\n";
        let rows = parse_rows(body, true).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_malformed_row() {
        assert!(parse_rows("too,few,fields\n", false).is_err());
    }
}
