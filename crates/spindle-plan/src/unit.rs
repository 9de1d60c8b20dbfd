use serde::{Deserialize, Serialize};

use spindle_core::execution::Direction;
use spindle_core::filter::FilterStack;
use spindle_core::resource::Resource;

/// One schedulable step of a run: an item executed in one direction under
/// one filter stack.
///
/// The resource lists are resolved by the engine immediately before
/// dispatch, so a unit always sees what earlier units actually produced
/// rather than a plan-time snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionUnit {
    pub item: String,
    pub direction: Direction,
    pub filter_stack: FilterStack,
    #[serde(default)]
    pub resources_from_predecessors: Vec<Resource>,
    #[serde(default)]
    pub resources_from_successors: Vec<Resource>,
}

impl ExecutionUnit {
    pub fn new(item: impl Into<String>, direction: Direction, filter_stack: FilterStack) -> Self {
        Self {
            item: item.into(),
            direction,
            filter_stack,
            resources_from_predecessors: Vec::new(),
            resources_from_successors: Vec::new(),
        }
    }

    /// Short display form for logs and `--list-items`.
    pub fn describe(&self) -> String {
        if self.filter_stack.is_empty() {
            format!("{} [{}]", self.item, self.direction)
        } else {
            format!(
                "{} [{}] {{{}}}",
                self.item,
                self.direction,
                self.filter_stack.filter_id().replace('\n', "; ")
            )
        }
    }
}
