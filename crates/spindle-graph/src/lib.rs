//! Project graph and resource propagation.
//!
//! `ProjectGraph` owns item identity and filtered connections and guarantees
//! acyclicity; `ResourcePropagator` maintains each item's view of what its
//! neighbors provide; `ProjectModel` keeps the two in lock-step for the
//! authoring surface.

pub mod advertise;
pub mod graph;
pub mod model;
pub mod propagator;

pub use advertise::Advertiser;
pub use graph::{Connection, ItemNode, ProjectGraph};
pub use model::ProjectModel;
pub use propagator::{PropagatorObserver, ResourcePropagator};
