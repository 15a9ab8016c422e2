//! Core plan validation, execution, and retry-loop logic.

pub mod executor;
pub mod parser;
pub mod prompts;
pub mod retry;
pub mod runner;
pub mod safety;
pub mod session;

pub use executor::{ExecutionContext, ExecutionResult, run_command, write_file};
pub use parser::{ClassifiedPlan, FileOperations, PlanItem, classify, parse_items};
pub use prompts::{clean_response, wrap_for_planning, wrap_for_refinement};
pub use retry::{RetryClass, RetryConfig, Retryable, run_with_retry};
pub use runner::{ExecutionPolicy, PlanOutcome, execute_plan};
pub use safety::is_unsafe;
pub use session::{
    RetrySession, SessionOptions, SessionOutcome, SessionPhase, run_session,
};
