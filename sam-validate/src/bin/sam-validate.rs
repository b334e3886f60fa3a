use clap::Parser;
use human_panic::setup_panic;
use sam_validate::prelude::*;
use tracing::{enabled, error, info, warn, Level};

/// sam-validate
///
/// A pre-commit hook to validate AWS SAM templates. Each template given
/// on the command line is checked with its own `sam validate` run, all
/// of them in parallel.
#[derive(Parser)]
#[clap(author, version = env!("SAM_VALIDATE_VERSION"), about)]
struct Cli {
    #[clap(flatten)]
    logging: LoggingOpts,

    #[clap(flatten)]
    config: ConfigOptions,

    #[clap(flatten)]
    validate: ValidateArgs,
}

#[tokio::main]
async fn main() {
    setup_panic!();
    dotenvy::dotenv().ok();
    let opts = Cli::parse();

    let run_id = opts.config.get_run_id();
    let logging = opts.logging.configure_logging(&run_id).await;
    let (guard, file_location) = match logging {
        Ok(Some((guard, file_location))) => (Some(guard), Some(file_location)),
        Ok(None) => (None, None),
        Err(e) => {
            eprintln!("Unable to write logs to {}: {}", LOG_DIR, e);
            (None, None)
        }
    };

    let error_code = run_validation(&opts, &run_id).await;

    if let Some(file_location) = file_location {
        if error_code != 0 {
            warn!(target: "user", "More detailed logs at {}", file_location);
        } else if enabled!(Level::DEBUG) {
            info!(target: "user", "More detailed logs at {}", file_location);
        }
    }

    // flush the log file before exiting
    drop(guard);
    std::process::exit(error_code);
}

async fn run_validation(opts: &Cli, run_id: &str) -> i32 {
    let found_config = match opts.config.load_config(run_id) {
        Err(e) => {
            error!(target: "user", "Failed to load configuration: {}", e);
            return 2;
        }
        Ok(c) => c,
    };

    validate_root(&found_config, &opts.validate)
        .await
        .unwrap_or_else(|e| {
            error!(target: "user", "Critical Error. {}", e);
            1
        })
}
