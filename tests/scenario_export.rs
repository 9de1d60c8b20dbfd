use std::path::Path;

use spindle_core::config::RunnerSettings;
use spindle_core::filter::FilterKind;
use spindle_core::item::{ItemConfig, ItemSpec};
use spindle_core::project::{ConnectionDef, ProjectDirs, ProjectFile};
use spindle_engine::{ExecutionEngine, RunContext};
use spindle_graph::ProjectModel;
use spindle_plan::ExecutionPlanner;
use spindle_store::{ParameterDb, ParameterValue};

fn seed_store(dirs: &ProjectDirs, name: &str) {
    let short = spindle_core::item::short_name(name);
    let url = format!(
        "sqlite://{}",
        dirs.default_database_path(&short, name).display()
    );
    let db = ParameterDb::create_mapping(&url, true).unwrap();
    db.import_object_classes(&["Widget"]).unwrap();
    db.import_objects(&[("Widget", "spoon")]).unwrap();
    db.import_object_parameters(&[("Widget", "volume")]).unwrap();
    db.import_alternatives(&["alternative"]).unwrap();
    db.import_object_parameter_values(&[
        ("Widget", "spoon", "volume", "Base", ParameterValue::Float(1.0)),
        (
            "Widget",
            "spoon",
            "volume",
            "alternative",
            ParameterValue::Float(2.0),
        ),
    ])
    .unwrap();
    db.import_scenarios(&["scenario"]).unwrap();
    db.import_scenario_alternatives(&[("scenario", "alternative", 1)])
        .unwrap();
    db.commit_session("seed").unwrap();
}

async fn run(project: &ProjectFile, root: &Path) -> spindle_core::execution::RunSummary {
    let mut model = ProjectModel::from_project_file(project, root).unwrap();
    let units = ExecutionPlanner::new(&model).plan(None).unwrap();
    let ctx = RunContext::new(ProjectDirs::new(root), RunnerSettings::default());
    ExecutionEngine::new(ctx)
        .run(&mut model, &units)
        .await
        .unwrap()
}

fn output_subdirs(dirs: &ProjectDirs, short_name: &str) -> Vec<String> {
    let mut subdirs: Vec<String> = std::fs::read_dir(dirs.output_dir(short_name))
        .unwrap()
        .flatten()
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    subdirs.sort();
    subdirs
}

/// Enabling the scenario filter on the store→exporter connection (what a
/// modifier script does before execution) yields exactly one output
/// directory whose filter id names the scenario and whose rows come from
/// the selected alternative only.
#[tokio::test]
async fn scenario_filtered_export() {
    let dir = tempfile::tempdir().unwrap();
    let dirs = ProjectDirs::new(dir.path());

    let mut project = ProjectFile::default();
    project
        .items
        .push(ItemSpec::new("Data", ItemConfig::DataStore { url: None }));
    project
        .items
        .push(ItemSpec::new("Out", ItemConfig::Exporter {}));
    project.connections.push(ConnectionDef::new("Data", "Out"));
    project.save(dir.path()).unwrap();
    seed_store(&dirs, "Data");

    // The modifier pass: reload the persisted project, enable the filter,
    // write it back.
    let mut modified = ProjectFile::load(dir.path()).unwrap();
    modified.connections[0]
        .filters
        .insert(FilterKind::Scenario, vec!["scenario".into()]);
    modified.save(dir.path()).unwrap();

    let project = ProjectFile::load(dir.path()).unwrap();
    let summary = run(&project, dir.path()).await;
    assert!(summary.succeeded());

    let subdirs = output_subdirs(&dirs, "out");
    assert_eq!(subdirs, vec!["scenario"]);

    let out_dir = dirs.output_dir("out").join("scenario");
    let filter_id = std::fs::read_to_string(out_dir.join(".filter_id")).unwrap();
    assert_eq!(filter_id.trim_end(), "scenario - Data");

    let csv = std::fs::read_to_string(out_dir.join("out.csv")).unwrap();
    let rows: Vec<&str> = csv.lines().collect();
    assert_eq!(rows, vec!["alternative,2.0"]);
}

/// Two enabled scenarios fan one connection out into two units and two
/// output directories, each filter-correct.
#[tokio::test]
async fn filter_cross_product_one_directory_per_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let dirs = ProjectDirs::new(dir.path());

    let mut project = ProjectFile::default();
    project
        .items
        .push(ItemSpec::new("Data", ItemConfig::DataStore { url: None }));
    project
        .items
        .push(ItemSpec::new("Out", ItemConfig::Exporter {}));
    let mut conn = ConnectionDef::new("Data", "Out");
    conn.filters
        .insert(FilterKind::Scenario, vec!["s1".into(), "s2".into()]);
    project.connections.push(conn);
    project.save(dir.path()).unwrap();

    // s1 selects `low`, s2 selects `high`
    let url = format!(
        "sqlite://{}",
        dirs.default_database_path("data", "Data").display()
    );
    let db = ParameterDb::create_mapping(&url, true).unwrap();
    db.import_object_classes(&["Widget"]).unwrap();
    db.import_objects(&[("Widget", "spoon")]).unwrap();
    db.import_object_parameters(&[("Widget", "volume")]).unwrap();
    db.import_alternatives(&["low", "high"]).unwrap();
    db.import_object_parameter_values(&[
        ("Widget", "spoon", "volume", "low", ParameterValue::Float(10.0)),
        ("Widget", "spoon", "volume", "high", ParameterValue::Float(20.0)),
    ])
    .unwrap();
    db.import_scenarios(&["s1", "s2"]).unwrap();
    db.import_scenario_alternatives(&[("s1", "low", 1), ("s2", "high", 1)])
        .unwrap();
    db.commit_session("seed").unwrap();
    drop(db);

    let summary = run(&project, dir.path()).await;
    assert!(summary.succeeded());

    let subdirs = output_subdirs(&dirs, "out");
    assert_eq!(subdirs, vec!["s1", "s2"]);

    let s1_csv = std::fs::read_to_string(dirs.output_dir("out").join("s1/out.csv")).unwrap();
    assert_eq!(s1_csv.lines().collect::<Vec<_>>(), vec!["low,10.0"]);
    let s2_csv = std::fs::read_to_string(dirs.output_dir("out").join("s2/out.csv")).unwrap();
    assert_eq!(s2_csv.lines().collect::<Vec<_>>(), vec!["high,20.0"]);

    let s1_id = std::fs::read_to_string(dirs.output_dir("out").join("s1/.filter_id")).unwrap();
    assert_eq!(s1_id.trim_end(), "s1 - Data");
    let s2_id = std::fs::read_to_string(dirs.output_dir("out").join("s2/.filter_id")).unwrap();
    assert_eq!(s2_id.trim_end(), "s2 - Data");
}
