//! Cadence Config
//!
//! Serializable workflow definitions. A workflow is an ordered list of steps,
//! each naming a module function by its `category.module.function` path, plus
//! the trigger that starts it.
//!
//! Definitions are loaded from JSON files (CLI) or from the workflow store,
//! where they are kept as JSON blobs.

mod step;
mod trigger;
mod workflow;

pub use step::StepDef;
pub use trigger::{FieldType, InputField, TriggerConfig, TriggerDef, TriggerError, TriggerType};
pub use workflow::{WorkflowDef, WorkflowStatus};
