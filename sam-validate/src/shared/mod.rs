mod capture;
mod config;
mod logging;

pub const RUN_ID_ENV_VAR: &str = "SAM_VALIDATE_RUN_ID";

pub mod prelude {
    pub use super::capture::{
        CaptureError, CaptureOpts, DefaultExecutionProvider, ExecutionProvider,
        MockExecutionProvider, OutputCapture, OutputCaptureBuilder,
    };
    pub use super::config::{ConfigOptions, FoundConfig};
    pub use super::logging::{LoggingOpts, LOG_DIR, STDOUT_WRITER};
    pub use super::RUN_ID_ENV_VAR;
}
