use std::collections::HashMap;

use tracing::debug;

use spindle_core::error::{Result, SpindleError};
use spindle_core::resource::Resource;

use crate::graph::{Connection, ProjectGraph};

/// Receives resource notifications on behalf of items.
///
/// Replacement notifications carry both the old and the new lists so a
/// receiver can drop cached state for the removed entries only.
pub trait PropagatorObserver {
    fn upstream_resources_updated(&mut self, item: &str, new: &[Resource]) {
        let _ = (item, new);
    }
    fn downstream_resources_updated(&mut self, item: &str, new: &[Resource]) {
        let _ = (item, new);
    }
    fn replace_resources_from_upstream(&mut self, item: &str, old: &[Resource], new: &[Resource]) {
        let _ = (item, old, new);
    }
    fn replace_resources_from_downstream(&mut self, item: &str, old: &[Resource], new: &[Resource]) {
        let _ = (item, old, new);
    }
}

/// Maintains, per item, the resources visible from its predecessors and
/// successors.
///
/// The propagator is synchronous: every mutation handler completes before
/// the next graph edit or execution step, so the maps never lag the graph.
/// It pulls advertised resources from items; items never push back during
/// notification handling.
#[derive(Default)]
pub struct ResourcePropagator {
    /// What each item advertises to direct successors.
    advertised_succ: HashMap<String, Vec<Resource>>,
    /// What each item advertises to direct predecessors.
    advertised_pred: HashMap<String, Vec<Resource>>,
    /// Per item: resources visible from upstream, in predecessor insertion
    /// order.
    upstream: HashMap<String, Vec<Resource>>,
    /// Per item: resources visible from downstream, in successor insertion
    /// order.
    downstream: HashMap<String, Vec<Resource>>,
    observers: Vec<Box<dyn PropagatorObserver>>,
}

impl ResourcePropagator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(&mut self, observer: Box<dyn PropagatorObserver>) {
        self.observers.push(observer);
    }

    /// Register a freshly added item with its advertised resources. No
    /// propagation happens until a connection is added.
    pub fn on_item_added(&mut self, name: &str, successors: Vec<Resource>, predecessors: Vec<Resource>) {
        self.advertised_succ.insert(name.to_string(), successors);
        self.advertised_pred.insert(name.to_string(), predecessors);
        self.upstream.insert(name.to_string(), Vec::new());
        self.downstream.insert(name.to_string(), Vec::new());
    }

    /// A new edge: src's successor-resources flow to dst, dst's
    /// predecessor-resources flow back to src.
    pub fn on_connection_added(&mut self, src: &str, dst: &str) {
        let forward = self.advertised_succ.get(src).cloned().unwrap_or_default();
        if !forward.is_empty() {
            self.upstream.entry(dst.to_string()).or_default().extend(forward.clone());
        }
        for obs in &mut self.observers {
            obs.upstream_resources_updated(dst, &forward);
        }

        let backward = self.advertised_pred.get(dst).cloned().unwrap_or_default();
        if !backward.is_empty() {
            self.downstream.entry(src.to_string()).or_default().extend(backward.clone());
        }
        for obs in &mut self.observers {
            obs.downstream_resources_updated(src, &backward);
        }
        debug!(src, dst, forward = forward.len(), backward = backward.len(), "Resources propagated");
    }

    /// Withdraw an edge's contributions. Call after the graph edge is gone.
    pub fn on_connection_removed(&mut self, graph: &ProjectGraph, src: &str, dst: &str) {
        let old = self.advertised_succ.get(src).cloned().unwrap_or_default();
        self.rebuild_upstream(graph, dst);
        for obs in &mut self.observers {
            obs.replace_resources_from_upstream(dst, &old, &[]);
        }

        let old = self.advertised_pred.get(dst).cloned().unwrap_or_default();
        self.rebuild_downstream(graph, src);
        for obs in &mut self.observers {
            obs.replace_resources_from_downstream(src, &old, &[]);
        }
    }

    /// Withdraw a removed item and every edge it carried. Call after the
    /// graph removal, passing the edges the graph cascaded away.
    pub fn on_item_removed(&mut self, graph: &ProjectGraph, name: &str, removed: &[Connection]) {
        for conn in removed {
            if conn.src == name && graph.contains(&conn.dst) {
                let old = self.advertised_succ.get(name).cloned().unwrap_or_default();
                self.rebuild_upstream(graph, &conn.dst);
                for obs in &mut self.observers {
                    obs.replace_resources_from_upstream(&conn.dst, &old, &[]);
                }
            }
            if conn.dst == name && graph.contains(&conn.src) {
                let old = self.advertised_pred.get(name).cloned().unwrap_or_default();
                self.rebuild_downstream(graph, &conn.src);
                for obs in &mut self.observers {
                    obs.replace_resources_from_downstream(&conn.src, &old, &[]);
                }
            }
        }
        self.advertised_succ.remove(name);
        self.advertised_pred.remove(name);
        self.upstream.remove(name);
        self.downstream.remove(name);
    }

    /// An item's advertised output changed (typically: execution produced
    /// the actual files behind transient advertisements). Each neighbor gets
    /// a partial replace.
    pub fn on_item_output_changed(
        &mut self,
        graph: &ProjectGraph,
        name: &str,
        new_successors: Vec<Resource>,
        new_predecessors: Vec<Resource>,
    ) {
        let old_succ = self
            .advertised_succ
            .insert(name.to_string(), new_successors.clone())
            .unwrap_or_default();
        let old_pred = self
            .advertised_pred
            .insert(name.to_string(), new_predecessors.clone())
            .unwrap_or_default();

        let successors: Vec<String> = graph.successors(name).map(String::from).collect();
        for succ in successors {
            self.rebuild_upstream(graph, &succ);
            for obs in &mut self.observers {
                obs.replace_resources_from_upstream(&succ, &old_succ, &new_successors);
            }
        }
        let predecessors: Vec<String> = graph.predecessors(name).map(String::from).collect();
        for pred in predecessors {
            self.rebuild_downstream(graph, &pred);
            for obs in &mut self.observers {
                obs.replace_resources_from_downstream(&pred, &old_pred, &new_predecessors);
            }
        }
    }

    pub fn upstream_resources(&self, name: &str) -> &[Resource] {
        self.upstream.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn downstream_resources(&self, name: &str) -> &[Resource] {
        self.downstream.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn advertised_to_successors(&self, name: &str) -> &[Resource] {
        self.advertised_succ.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn advertised_to_predecessors(&self, name: &str) -> &[Resource] {
        self.advertised_pred.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    fn rebuild_upstream(&mut self, graph: &ProjectGraph, item: &str) {
        let rebuilt: Vec<Resource> = graph
            .predecessors(item)
            .flat_map(|p| self.advertised_succ.get(p).cloned().unwrap_or_default())
            .collect();
        self.upstream.insert(item.to_string(), rebuilt);
    }

    fn rebuild_downstream(&mut self, graph: &ProjectGraph, item: &str) {
        let rebuilt: Vec<Resource> = graph
            .successors(item)
            .flat_map(|s| self.advertised_pred.get(s).cloned().unwrap_or_default())
            .collect();
        self.downstream.insert(item.to_string(), rebuilt);
    }

    /// Verify the concatenation invariant for every item. A violation is a
    /// bug in the propagation bookkeeping, not in user input.
    pub fn check_invariants(&self, graph: &ProjectGraph) -> Result<()> {
        for node in graph.items() {
            let name = &node.spec.name;
            let expected: Vec<Resource> = graph
                .predecessors(name)
                .flat_map(|p| self.advertised_succ.get(p).cloned().unwrap_or_default())
                .collect();
            if self.upstream_resources(name) != expected.as_slice() {
                return Err(SpindleError::InternalInvariant(format!(
                    "upstream resources of {} diverge from predecessor advertisements",
                    name
                )));
            }
            for resource in self.upstream_resources(name) {
                if !graph.predecessors(name).any(|p| p == resource.provider) {
                    return Err(SpindleError::InternalInvariant(format!(
                        "upstream resource '{}' of {} has non-predecessor provider {}",
                        resource.label, name, resource.provider
                    )));
                }
            }
        }
        Ok(())
    }
}
