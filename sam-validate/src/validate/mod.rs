mod cli;
mod command;
mod error;
mod runner;

pub mod prelude {
    pub use super::cli::{validate_root, ValidateArgs};
    pub use super::command::{
        CommandBuilder, CommandInvocation, ValidationOptions, ValidationOptionsBuilder,
    };
    pub use super::error::RunnerError;
    pub use super::runner::{
        effective_pool_size, representative_exit_code, write_result, ExecutionResult,
        ParallelRunner,
    };
}
