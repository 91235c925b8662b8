//! Deployment module

pub mod archive;
pub mod executor;
pub mod fsm;
pub mod observer;
pub mod orchestrator;
pub mod plan;
pub mod recorder;
pub mod selector;

pub use archive::{ArchiveBuilder, ZipArchiveBuilder};
pub use executor::{RunReport, StepExecutor, StepOutcome, StepStatus};
pub use observer::{DeployObserver, SilentObserver};
pub use orchestrator::{DeployOptions, DeployOutcome, Orchestrator, PlannedServer, ServerRun};
pub use plan::{plan, PlanOptions, Step};
pub use selector::{Prompt, ServerSelector};
