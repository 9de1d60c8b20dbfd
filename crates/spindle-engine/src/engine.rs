use std::collections::{HashMap, HashSet};
use std::time::Instant;

use tracing::{error, info, warn};

use spindle_core::error::{Result, SpindleError};
use spindle_core::event::ExecutionEvent;
use spindle_core::execution::{Direction, RunSummary, UnitOutcome, UnitStatus};
use spindle_core::resource::Resource;
use spindle_graph::ProjectModel;
use spindle_plan::ExecutionUnit;

use crate::adapters;
use crate::context::RunContext;
use crate::filtering::filtered_view;

/// Drives execution units strictly in plan order.
///
/// Units run one at a time; the engine blocks on each subprocess, so the
/// only writer a shared database ever has is the unit currently executing,
/// and every side effect of an earlier unit is on disk before a later unit
/// reads. The cooperative cancel flag is checked between units.
pub struct ExecutionEngine {
    ctx: RunContext,
}

impl ExecutionEngine {
    pub fn new(ctx: RunContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub async fn run(&self, model: &mut ProjectModel, units: &[ExecutionUnit]) -> Result<RunSummary> {
        let start = Instant::now();
        self.ctx.events.publish(ExecutionEvent::RunStarted {
            run_id: self.ctx.run_id.clone(),
            unit_count: units.len(),
        });
        info!(run_id = %self.ctx.run_id, units = units.len(), "Run started");

        let mut outcomes = Vec::with_capacity(units.len());
        // Items that failed or were skipped; anything downstream of them is
        // skipped too.
        let mut poisoned: HashSet<String> = HashSet::new();
        let mut produced_forward: HashMap<String, Vec<Resource>> = HashMap::new();
        let mut cancelled = false;

        for unit in units {
            if self.ctx.cancel.is_cancelled() {
                cancelled = true;
            }
            if cancelled {
                outcomes.push(self.skip(unit, "run cancelled"));
                continue;
            }
            let upstream_poisoned = poisoned.contains(&unit.item)
                || model
                    .graph
                    .predecessors(&unit.item)
                    .any(|p| poisoned.contains(p));
            if upstream_poisoned {
                poisoned.insert(unit.item.clone());
                outcomes.push(self.skip(unit, "predecessor failed"));
                continue;
            }

            let resolved = self.resolve(model, unit);
            self.ctx.events.publish(ExecutionEvent::UnitStarted {
                item: unit.item.clone(),
                direction: unit.direction,
                filter_id: unit.filter_stack.filter_id(),
            });
            info!(item = %unit.item, direction = %unit.direction, "Executing unit");

            let unit_start = Instant::now();
            let result = adapters::execute(&self.ctx, model, &resolved).await;
            let elapsed_ms = unit_start.elapsed().as_millis() as u64;

            match result {
                Ok(output) => {
                    self.install(model, &resolved, &output.produced, &mut produced_forward);
                    adapters::handle_execution_successful(model, &resolved);
                    for message in &output.diagnostics {
                        self.ctx.events.publish(ExecutionEvent::Diagnostic {
                            item: unit.item.clone(),
                            message: message.clone(),
                        });
                    }
                    self.finish(
                        &mut outcomes,
                        unit,
                        UnitStatus::Succeeded,
                        elapsed_ms,
                        output.produced.len(),
                        output.diagnostics,
                    );
                }
                Err(SpindleError::Cancelled) => {
                    warn!(item = %unit.item, "Unit cancelled");
                    cancelled = true;
                    poisoned.insert(unit.item.clone());
                    self.finish(
                        &mut outcomes,
                        unit,
                        UnitStatus::Failed,
                        elapsed_ms,
                        0,
                        vec!["run cancelled".to_string()],
                    );
                }
                Err(e) => {
                    error!(item = %unit.item, error = %e, "Unit failed");
                    poisoned.insert(unit.item.clone());
                    self.ctx.events.publish(ExecutionEvent::Diagnostic {
                        item: unit.item.clone(),
                        message: e.to_string(),
                    });
                    self.finish(
                        &mut outcomes,
                        unit,
                        UnitStatus::Failed,
                        elapsed_ms,
                        0,
                        vec![e.to_string()],
                    );
                }
            }
        }

        let summary = RunSummary {
            run_id: self.ctx.run_id.clone(),
            outcomes,
            total_elapsed_ms: start.elapsed().as_millis() as u64,
        };
        self.ctx.events.publish(ExecutionEvent::RunFinished {
            run_id: self.ctx.run_id.clone(),
            succeeded: summary.succeeded(),
        });
        let (ok, failed, skipped) = summary.counts();
        info!(run_id = %self.ctx.run_id, ok, failed, skipped, "Run finished");
        Ok(summary)
    }

    /// Resolve the unit's input resources from the propagator through its
    /// filter stack, immediately before dispatch.
    fn resolve(&self, model: &ProjectModel, unit: &ExecutionUnit) -> ExecutionUnit {
        let mut resolved = unit.clone();
        resolved.resources_from_predecessors = filtered_view(
            model,
            &unit.filter_stack,
            model.propagator.upstream_resources(&unit.item),
        );
        resolved.resources_from_successors = filtered_view(
            model,
            &unit.filter_stack,
            model.propagator.downstream_resources(&unit.item),
        );
        resolved
    }

    /// Install produced resources into the propagator so later units see
    /// them. Forward passes re-advertise to successors; the backward pass
    /// publishes the accumulated outputs to predecessors.
    fn install(
        &self,
        model: &mut ProjectModel,
        unit: &ExecutionUnit,
        produced: &[Resource],
        produced_forward: &mut HashMap<String, Vec<Resource>>,
    ) {
        match unit.direction {
            Direction::Forward => {
                if produced.is_empty() {
                    return;
                }
                let accumulated = produced_forward.entry(unit.item.clone()).or_default();
                for resource in produced {
                    if !accumulated.contains(resource) {
                        accumulated.push(resource.clone());
                    }
                }
                // Databases stay advertised; file advertisements (transient
                // or pattern) are superseded by what actually got produced.
                let mut new_successors: Vec<Resource> = model
                    .propagator
                    .advertised_to_successors(&unit.item)
                    .iter()
                    .filter(|r| r.is_database())
                    .cloned()
                    .collect();
                new_successors.extend(accumulated.iter().cloned());
                let new_predecessors =
                    model.propagator.advertised_to_predecessors(&unit.item).to_vec();
                model.refresh_outputs(&unit.item, new_successors, new_predecessors);
                self.ctx.events.publish(ExecutionEvent::ResourcesProduced {
                    item: unit.item.clone(),
                    count: produced.len(),
                });
            }
            Direction::Backward => {
                let Some(accumulated) = produced_forward.get(&unit.item) else {
                    return;
                };
                if accumulated.is_empty() || model.graph.predecessors(&unit.item).next().is_none() {
                    return;
                }
                let new_successors =
                    model.propagator.advertised_to_successors(&unit.item).to_vec();
                let mut new_predecessors =
                    model.propagator.advertised_to_predecessors(&unit.item).to_vec();
                for resource in accumulated.clone() {
                    if !new_predecessors.contains(&resource) {
                        new_predecessors.push(resource);
                    }
                }
                model.refresh_outputs(&unit.item, new_successors, new_predecessors);
            }
        }
    }

    fn skip(&self, unit: &ExecutionUnit, reason: &str) -> UnitOutcome {
        self.ctx.events.publish(ExecutionEvent::UnitFinished {
            item: unit.item.clone(),
            direction: unit.direction,
            filter_id: unit.filter_stack.filter_id(),
            status: UnitStatus::Skipped,
            elapsed_ms: 0,
        });
        info!(item = %unit.item, direction = %unit.direction, reason, "Unit skipped");
        UnitOutcome {
            item: unit.item.clone(),
            direction: unit.direction,
            filter_id: unit.filter_stack.filter_id(),
            status: UnitStatus::Skipped,
            elapsed_ms: 0,
            produced: 0,
            diagnostics: vec![reason.to_string()],
        }
    }

    fn finish(
        &self,
        outcomes: &mut Vec<UnitOutcome>,
        unit: &ExecutionUnit,
        status: UnitStatus,
        elapsed_ms: u64,
        produced: usize,
        diagnostics: Vec<String>,
    ) {
        self.ctx.events.publish(ExecutionEvent::UnitFinished {
            item: unit.item.clone(),
            direction: unit.direction,
            filter_id: unit.filter_stack.filter_id(),
            status,
            elapsed_ms,
        });
        outcomes.push(UnitOutcome {
            item: unit.item.clone(),
            direction: unit.direction,
            filter_id: unit.filter_stack.filter_id(),
            status,
            elapsed_ms,
            produced,
            diagnostics,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spindle_core::config::RunnerSettings;
    use spindle_core::item::{ItemConfig, ItemSpec, ToolSpecification};
    use spindle_core::project::{ConnectionDef, ProjectDirs, ProjectFile};
    use spindle_plan::ExecutionPlanner;

    fn project_with_tool(command: &str) -> ProjectFile {
        let mut project = ProjectFile::default();
        project.specifications.insert(
            "run".into(),
            ToolSpecification {
                program: "sh".into(),
                args: vec!["-c".into(), command.into()],
                output_files: vec!["result.txt".into()],
            },
        );
        project.items.push(ItemSpec::new(
            "Cruncher",
            ItemConfig::Tool {
                specification: Some("run".into()),
                cmd_line_args: vec![],
            },
        ));
        project.items.push(ItemSpec::new("Sink", ItemConfig::View {}));
        project
            .connections
            .push(ConnectionDef::new("Cruncher", "Sink"));
        project
    }

    async fn run_project(project: &ProjectFile, root: &std::path::Path) -> RunSummary {
        let mut model = ProjectModel::from_project_file(project, root).unwrap();
        let units = ExecutionPlanner::new(&model).plan(None).unwrap();
        let ctx = RunContext::new(ProjectDirs::new(root), RunnerSettings::default());
        ExecutionEngine::new(ctx).run(&mut model, &units).await.unwrap()
    }

    #[tokio::test]
    async fn test_tool_success_produces_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let project = project_with_tool("echo data > result.txt");
        let summary = run_project(&project, dir.path()).await;
        assert!(summary.succeeded());
        let tool_outcome = &summary.outcomes[0];
        assert_eq!(tool_outcome.item, "Cruncher");
        assert_eq!(tool_outcome.status, UnitStatus::Succeeded);
        assert_eq!(tool_outcome.produced, 1);
    }

    #[tokio::test]
    async fn test_tool_failure_skips_successors() {
        let dir = tempfile::tempdir().unwrap();
        let project = project_with_tool("echo partial > result.txt; exit 2");
        let summary = run_project(&project, dir.path()).await;
        assert!(!summary.succeeded());

        let by_item: Vec<(&str, UnitStatus)> = summary
            .outcomes
            .iter()
            .filter(|o| o.direction == Direction::Forward)
            .map(|o| (o.item.as_str(), o.status))
            .collect();
        assert_eq!(
            by_item,
            vec![("Cruncher", UnitStatus::Failed), ("Sink", UnitStatus::Skipped)]
        );
        // Partial outputs are discarded, not visible to anyone
        let work_dir = ProjectDirs::new(dir.path())
            .item_dir("cruncher")
            .join("work");
        assert!(!work_dir.join("unfiltered").join("result.txt").exists());
    }

    #[tokio::test]
    async fn test_cancel_before_run_skips_everything() {
        let dir = tempfile::tempdir().unwrap();
        let project = project_with_tool("echo ok > result.txt");
        let mut model = ProjectModel::from_project_file(&project, dir.path()).unwrap();
        let units = ExecutionPlanner::new(&model).plan(None).unwrap();
        let ctx = RunContext::new(ProjectDirs::new(dir.path()), RunnerSettings::default());
        ctx.cancel.cancel();
        let summary = ExecutionEngine::new(ctx)
            .run(&mut model, &units)
            .await
            .unwrap();
        assert!(!summary.succeeded());
        assert!(summary
            .outcomes
            .iter()
            .all(|o| o.status == UnitStatus::Skipped));
    }

    #[tokio::test]
    async fn test_backward_pass_publishes_to_predecessors() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = project_with_tool("echo data > result.txt");
        project
            .items
            .push(ItemSpec::new("Upstream", ItemConfig::DataConnection {
                file_references: vec![],
            }));
        project
            .connections
            .push(ConnectionDef::new("Upstream", "Cruncher"));

        let mut model = ProjectModel::from_project_file(&project, dir.path()).unwrap();
        let units = ExecutionPlanner::new(&model).plan(None).unwrap();
        let ctx = RunContext::new(ProjectDirs::new(dir.path()), RunnerSettings::default());
        let summary = ExecutionEngine::new(ctx)
            .run(&mut model, &units)
            .await
            .unwrap();
        assert!(summary.succeeded());
        // After the backward pass the upstream item sees the tool's output
        let downstream = model.propagator.downstream_resources("Upstream");
        assert!(downstream.iter().any(|r| r.label == "result.txt"));
    }
}

