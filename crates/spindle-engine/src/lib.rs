//! Execution engine: drives planned units in order through per-kind item
//! adapters, feeds produced resources back into the propagator, and reports
//! outcomes through the event bus.

pub mod adapters;
pub mod context;
pub mod engine;
pub mod filtering;
pub mod subprocess;

pub use context::RunContext;
pub use engine::ExecutionEngine;
pub use filtering::filtered_view;
