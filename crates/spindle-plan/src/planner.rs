use std::collections::HashSet;

use tracing::debug;

use spindle_core::error::{Result, SpindleError};
use spindle_core::execution::Direction;
use spindle_core::filter::{FilterEntry, FilterStack};
use spindle_core::item::{ItemConfig, ToolSpecification};
use spindle_graph::ProjectModel;

use crate::unit::ExecutionUnit;

/// Converts the project graph plus its filter configuration into the
/// ordered sequence of execution units for one run.
///
/// Planning is pure: it reads the graph and the propagator maps, never the
/// filesystem or a database. Errors abort before any unit executes and are
/// consolidated into one diagnostic.
pub struct ExecutionPlanner<'a> {
    model: &'a ProjectModel,
}

impl<'a> ExecutionPlanner<'a> {
    pub fn new(model: &'a ProjectModel) -> Self {
        Self { model }
    }

    /// Plan the whole project, or only `roots` and everything downstream of
    /// them.
    pub fn plan(&self, roots: Option<&[String]>) -> Result<Vec<ExecutionUnit>> {
        let selected = self.selected_items(roots)?;
        let order: Vec<String> = self
            .model
            .graph
            .topological_order()?
            .into_iter()
            .filter(|name| selected.contains(name))
            .collect();

        let mut problems = Vec::new();
        self.validate(&order, &mut problems);
        if !problems.is_empty() {
            return Err(consolidate(problems));
        }

        let mut forward = Vec::new();
        for name in &order {
            let mut stacks = self.inbound_stacks(name);
            // Units of one item are contiguous, ordered by stack string.
            stacks.sort_by_key(FilterStack::sort_key);
            for stack in stacks {
                forward.push(ExecutionUnit::new(name.clone(), Direction::Forward, stack));
            }
        }

        let mut units = forward.clone();
        units.extend(forward.into_iter().rev().map(|mut unit| {
            unit.direction = Direction::Backward;
            unit
        }));
        debug!(units = units.len(), "Plan assembled");
        Ok(units)
    }

    /// The requested subgraph: every root plus all items reachable forward.
    fn selected_items(&self, roots: Option<&[String]>) -> Result<HashSet<String>> {
        let Some(roots) = roots else {
            return Ok(self
                .model
                .graph
                .items()
                .map(|n| n.spec.name.clone())
                .collect());
        };
        let mut selected = HashSet::new();
        let mut stack: Vec<String> = Vec::new();
        for root in roots {
            if !self.model.graph.contains(root) {
                return Err(SpindleError::UnknownItem(root.clone()));
            }
            stack.push(root.clone());
        }
        while let Some(name) = stack.pop() {
            if !selected.insert(name.clone()) {
                continue;
            }
            stack.extend(self.model.graph.successors(&name).map(String::from));
        }
        Ok(selected)
    }

    /// Inbound filter cross-product for one item: over every predecessor and
    /// every filter kind with enabled values, in predecessor insertion
    /// order. Items with no filtered inbound edge get the empty stack.
    fn inbound_stacks(&self, item: &str) -> Vec<FilterStack> {
        let mut stacks = vec![FilterStack::new()];
        for pred in self.model.graph.predecessors(item) {
            let Some(conn) = self.model.graph.connection(pred, item) else {
                continue;
            };
            let label = self.source_label(pred);
            for (kind, values) in &conn.filters {
                if values.is_empty() {
                    continue;
                }
                let mut expanded = Vec::with_capacity(stacks.len() * values.len());
                for stack in &stacks {
                    for value in values {
                        let mut next = stack.clone();
                        next.push(FilterEntry::new(*kind, value.clone(), label.clone()));
                        expanded.push(next);
                    }
                }
                stacks = expanded;
            }
        }
        stacks
    }

    /// Label filters are announced under: the source's database label when
    /// it has one, its name otherwise.
    fn source_label(&self, item: &str) -> String {
        self.model
            .propagator
            .advertised_to_successors(item)
            .iter()
            .find(|r| r.is_database())
            .map(|r| r.label.clone())
            .unwrap_or_else(|| item.to_string())
    }

    fn validate(&self, order: &[String], problems: &mut Vec<SpindleError>) {
        for name in order {
            let Some(node) = self.model.graph.get(name) else {
                continue;
            };
            if let ItemConfig::Tool { specification, .. } = &node.spec.config {
                match specification.as_deref() {
                    None => problems.push(SpindleError::MissingSpecification { item: name.clone() }),
                    Some(spec_name) => {
                        let Some(tool_spec) = self.model.specifications().get(spec_name) else {
                            problems.push(SpindleError::MissingSpecification { item: name.clone() });
                            continue;
                        };
                        // Inputs the command template names must come from
                        // some predecessor.
                        for arg in &tool_spec.args {
                            if let Some(label) = ToolSpecification::input_placeholder(arg) {
                                let provided = self
                                    .model
                                    .propagator
                                    .upstream_resources(name)
                                    .iter()
                                    .any(|r| r.label == label);
                                if !provided {
                                    problems.push(SpindleError::UnreachableResource {
                                        item: name.clone(),
                                        label: label.to_string(),
                                    });
                                }
                            }
                        }
                    }
                }
            }
            // A filter on an edge whose source serves no database can never
            // admit anything.
            for pred in self.model.graph.predecessors(name) {
                let Some(conn) = self.model.graph.connection(pred, name) else {
                    continue;
                };
                if conn.filters.is_empty() {
                    continue;
                }
                let has_database = self
                    .model
                    .propagator
                    .advertised_to_successors(pred)
                    .iter()
                    .any(|r| r.is_database());
                if !has_database {
                    for (kind, values) in &conn.filters {
                        for value in values {
                            problems.push(SpindleError::FilterUnavailable {
                                kind: kind.to_string(),
                                value: value.clone(),
                                src: pred.to_string(),
                                dst: name.clone(),
                            });
                        }
                    }
                }
            }
        }
    }
}

fn consolidate(mut problems: Vec<SpindleError>) -> SpindleError {
    if problems.len() == 1 {
        return problems.remove(0);
    }
    let joined = problems
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join("\n");
    SpindleError::Planning(joined)
}
