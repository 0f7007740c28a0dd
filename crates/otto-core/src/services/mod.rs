pub mod restart;
pub mod task_mutation;

pub use restart::{NoopRestart, RestartRuntime};
pub use task_mutation::TaskMutationService;
