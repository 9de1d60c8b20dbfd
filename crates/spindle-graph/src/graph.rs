use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use spindle_core::error::{Result, SpindleError};
use spindle_core::filter::FilterKind;
use spindle_core::item::ItemSpec;

/// A registered item: its authored spec plus the insertion index that breaks
/// topological ties. The index is stable for the life of the project, so the
/// linearization is deterministic across runs.
#[derive(Debug, Clone)]
pub struct ItemNode {
    pub spec: ItemSpec,
    pub insertion_index: usize,
}

/// A directed edge with its filter configuration.
#[derive(Debug, Clone)]
pub struct Connection {
    pub src: String,
    pub dst: String,
    pub filters: BTreeMap<FilterKind, Vec<String>>,
}

/// The labeled project graph: items plus filtered connections.
///
/// All mutations are validated synchronously; an `Err` leaves the graph
/// untouched. The graph is acyclic at all times — `connect` refuses edges
/// that would close a cycle.
#[derive(Debug, Default)]
pub struct ProjectGraph {
    items: Vec<ItemNode>,
    by_name: HashMap<String, usize>,
    by_short_name: HashMap<String, String>,
    connections: Vec<Connection>,
    next_insertion_index: usize,
}

impl ProjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node. Both the name and the derived short name must be free.
    pub fn add_item(&mut self, spec: ItemSpec) -> Result<()> {
        spec.validate()?;
        if self.by_name.contains_key(&spec.name) {
            return Err(SpindleError::NameTaken(spec.name));
        }
        let short = spec.short_name();
        if let Some(holder) = self.by_short_name.get(&short) {
            return Err(SpindleError::NameTaken(format!(
                "{} (short name '{}' held by {})",
                spec.name, short, holder
            )));
        }
        debug!(item = %spec.name, kind = %spec.kind(), "Item added");
        self.by_name.insert(spec.name.clone(), self.items.len());
        self.by_short_name.insert(short, spec.name.clone());
        self.items.push(ItemNode {
            spec,
            insertion_index: self.next_insertion_index,
        });
        self.next_insertion_index += 1;
        Ok(())
    }

    /// Remove a node and its incident edges. Returns the removed spec and
    /// edges so the propagator can withdraw their resources.
    pub fn remove_item(&mut self, name: &str) -> Result<(ItemSpec, Vec<Connection>)> {
        let idx = *self
            .by_name
            .get(name)
            .ok_or_else(|| SpindleError::UnknownItem(name.to_string()))?;
        let node = self.items.remove(idx);
        self.by_name.remove(name);
        self.by_short_name.remove(&node.spec.short_name());
        // Reindex positions after the removal point
        for (pos, item) in self.items.iter().enumerate() {
            self.by_name.insert(item.spec.name.clone(), pos);
        }
        let (removed, kept): (Vec<_>, Vec<_>) = self
            .connections
            .drain(..)
            .partition(|c| c.src == name || c.dst == name);
        self.connections = kept;
        debug!(item = %name, removed_edges = removed.len(), "Item removed");
        Ok((node.spec, removed))
    }

    /// Add an edge. Fails without mutating on unknown endpoints, duplicate
    /// edges, self-loops, and edges that would close a cycle.
    pub fn connect(
        &mut self,
        src: &str,
        dst: &str,
        filters: Option<BTreeMap<FilterKind, Vec<String>>>,
    ) -> Result<()> {
        if !self.by_name.contains_key(src) {
            return Err(SpindleError::UnknownItem(src.to_string()));
        }
        if !self.by_name.contains_key(dst) {
            return Err(SpindleError::UnknownItem(dst.to_string()));
        }
        if self.connection(src, dst).is_some() {
            return Err(SpindleError::DuplicateEdge {
                src: src.to_string(),
                dst: dst.to_string(),
            });
        }
        // A self-loop is the smallest cycle; the reachability walk below
        // would miss it because dst == src is reachable trivially.
        if src == dst || self.reaches(dst, src) {
            return Err(SpindleError::CycleWould {
                src: src.to_string(),
                dst: dst.to_string(),
            });
        }
        debug!(src, dst, "Connection added");
        self.connections.push(Connection {
            src: src.to_string(),
            dst: dst.to_string(),
            filters: filters.unwrap_or_default(),
        });
        Ok(())
    }

    /// Remove an edge, returning it.
    pub fn disconnect(&mut self, src: &str, dst: &str) -> Result<Connection> {
        let pos = self
            .connections
            .iter()
            .position(|c| c.src == src && c.dst == dst)
            .ok_or_else(|| SpindleError::UnknownItem(format!("{} -> {}", src, dst)))?;
        Ok(self.connections.remove(pos))
    }

    /// Replace the enabled values of one filter kind on an edge.
    pub fn set_filter(
        &mut self,
        src: &str,
        dst: &str,
        kind: FilterKind,
        values: Vec<String>,
    ) -> Result<()> {
        let conn = self
            .connections
            .iter_mut()
            .find(|c| c.src == src && c.dst == dst)
            .ok_or_else(|| SpindleError::UnknownItem(format!("{} -> {}", src, dst)))?;
        if values.is_empty() {
            conn.filters.remove(&kind);
        } else {
            conn.filters.insert(kind, values);
        }
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ItemNode> {
        self.by_name.get(name).map(|&i| &self.items[i])
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in insertion order.
    pub fn items(&self) -> impl Iterator<Item = &ItemNode> {
        self.items.iter()
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter()
    }

    pub fn connection(&self, src: &str, dst: &str) -> Option<&Connection> {
        self.connections
            .iter()
            .find(|c| c.src == src && c.dst == dst)
    }

    /// Predecessor names in connection insertion order.
    pub fn predecessors<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.connections
            .iter()
            .filter(move |c| c.dst == name)
            .map(|c| c.src.as_str())
    }

    /// Successor names in connection insertion order.
    pub fn successors<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.connections
            .iter()
            .filter(move |c| c.src == name)
            .map(|c| c.dst.as_str())
    }

    /// Incremental DFS on the current graph: is `to` reachable from `from`?
    fn reaches(&self, from: &str, to: &str) -> bool {
        let mut stack = vec![from];
        let mut seen: Vec<&str> = Vec::new();
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if seen.contains(&current) {
                continue;
            }
            seen.push(current);
            stack.extend(self.successors(current));
        }
        false
    }

    /// Deterministic linearization: Kahn's algorithm, ties broken by item
    /// insertion index. Depends only on the node set, edge set, and node
    /// insertion order.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let mut in_degree: HashMap<&str, usize> = self
            .items
            .iter()
            .map(|n| (n.spec.name.as_str(), 0))
            .collect();
        for conn in &self.connections {
            *in_degree.get_mut(conn.dst.as_str()).ok_or_else(|| {
                SpindleError::InternalInvariant(format!("edge to unregistered item {}", conn.dst))
            })? += 1;
        }

        let mut order = Vec::with_capacity(self.items.len());
        let mut remaining: Vec<&ItemNode> = self.items.iter().collect();
        while !remaining.is_empty() {
            // Lowest insertion index among ready nodes; `remaining` keeps
            // insertion order, so the first ready hit is the winner.
            let pos = remaining
                .iter()
                .position(|n| in_degree[n.spec.name.as_str()] == 0)
                .ok_or_else(|| {
                    SpindleError::InternalInvariant("cycle in supposedly acyclic graph".into())
                })?;
            let node = remaining.remove(pos);
            for succ in self.successors(&node.spec.name) {
                if let Some(degree) = in_degree.get_mut(succ) {
                    *degree -= 1;
                }
            }
            order.push(node.spec.name.clone());
        }
        Ok(order)
    }
}
