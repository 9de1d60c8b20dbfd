pub mod config;
pub mod error;
pub mod event;
pub mod execution;
pub mod filter;
pub mod item;
pub mod project;
pub mod resource;

pub use config::RunnerSettings;
pub use error::{Result, SpindleError};
pub use event::{EventBus, ExecutionEvent};
pub use execution::{Direction, RunSummary, UnitOutcome, UnitStatus};
pub use filter::{FilterEntry, FilterKind, FilterStack};
pub use item::{short_name, ItemConfig, ItemKind, ItemSpec, ToolSpecification};
pub use project::{ConnectionDef, ProjectDirs, ProjectFile, DATA_DIR};
pub use resource::{Resource, ResourceKind};
