pub mod admission;
pub mod condition;
pub mod events;
pub mod graph;
pub mod publish;
pub mod retry;
pub mod runner;
pub mod state;
pub mod steps;
pub mod template;
pub mod validate;

pub use admission::{Admission, AdmissionPermit};
pub use events::EventEmitter;
pub use graph::Graph;
pub use publish::{RunHistory, RunManager, RunPublisher};
pub use retry::RetryPolicy;
pub use runner::{RunHandle, Runner};
pub use state::RunState;
pub use steps::{StepContext, StepExecutors};
pub use validate::{validate, Problem, Report};
