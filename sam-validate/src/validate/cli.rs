use super::command::{
    CommandBuilder, ValidationOptions, DEFAULT_CONFIG_ENV, DEFAULT_CONFIG_FILE,
    DEFAULT_SAM_BINARY,
};
use super::runner::{representative_exit_code, ParallelRunner};
use crate::shared::prelude::{DefaultExecutionProvider, FoundConfig};
use anyhow::Result;
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Skip linting, `--lint` is not passed to sam.
    #[arg(short, long)]
    pub no_lint: bool,

    /// Set the AWS Region of the service.
    #[arg(short, long)]
    pub region: Option<String>,

    /// Choose a specific profile from your credential file to get AWS credentials.
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Environment name specifying default parameter values in the configuration file.
    #[arg(short = 'e', long, default_value = DEFAULT_CONFIG_ENV)]
    pub config_env: String,

    /// Configuration file containing default parameter values.
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: String,

    /// Enable beta features.
    #[arg(short, long)]
    pub beta_features: bool,

    /// Turn on debug logging to print debug messages generated by AWS SAM CLI
    /// and display timestamps.
    #[arg(short, long)]
    pub debug: bool,

    /// How many templates are validated at the same time. 0 validates all of
    /// them at once.
    #[arg(
        short = 'j',
        long,
        default_value_t = 0,
        env = "SAM_VALIDATE_MAX_CONCURRENCY"
    )]
    pub max_concurrency: usize,

    /// The sam executable to run, looked up on PATH.
    #[arg(long, default_value = DEFAULT_SAM_BINARY, env = "SAM_VALIDATE_SAM_BINARY")]
    pub sam_binary: String,

    /// Stop a validation that runs longer than this many seconds.
    #[arg(long, env = "SAM_VALIDATE_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Templates to validate. When none are given, sam looks for its default template.
    pub filenames: Vec<String>,
}

impl From<&ValidateArgs> for ValidationOptions {
    fn from(args: &ValidateArgs) -> Self {
        Self {
            region: args.region.clone(),
            profile: args.profile.clone(),
            config_env: args.config_env.clone(),
            config_file: args.config_file.clone(),
            lint: !args.no_lint,
            beta_features: args.beta_features,
            debug: args.debug,
            max_concurrency: args.max_concurrency,
        }
    }
}

pub async fn validate_root(found_config: &FoundConfig, args: &ValidateArgs) -> Result<i32> {
    let options = ValidationOptions::from(args);
    let invocations = CommandBuilder::new(&args.sam_binary).build(&options, &args.filenames);
    debug!("Built commands {:?}", invocations);

    let runner = ParallelRunner::new(found_config, Arc::new(DefaultExecutionProvider::default()))
        .with_max_concurrency(options.max_concurrency)
        .with_timeout(args.timeout.map(Duration::from_secs));

    let results = runner.run(invocations).await?;

    let failed = results.iter().filter(|r| !r.is_success()).count();
    if failed > 0 {
        warn!(target: "user", "{} of {} validation(s) failed", failed, results.len());
    }

    Ok(representative_exit_code(
        results.iter().map(|result| result.exit_code),
    ))
}
