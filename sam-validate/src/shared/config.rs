use crate::shared::RUN_ID_ENV_VAR;
use anyhow::{anyhow, Result};
use clap::{ArgGroup, Parser};
use std::path::PathBuf;
use tracing::{debug, error};

#[derive(Parser, Debug)]
#[clap(group = ArgGroup::new("config"))]
pub struct ConfigOptions {
    /// Override the working directory the validator runs in
    #[arg(long, short = 'C')]
    working_dir: Option<String>,

    /// When outputting logs, the run-id is the unique value that will define where these go.
    /// In the case that the run-id is re-used, the old values will be overwritten.
    #[arg(long, env = RUN_ID_ENV_VAR)]
    run_id: Option<String>,
}

/// Process environment the validator is launched with.
#[derive(Debug, Clone)]
pub struct FoundConfig {
    pub working_dir: PathBuf,
    pub bin_path: String,
    pub run_id: String,
}

impl ConfigOptions {
    pub fn generate_run_id() -> String {
        let id = nanoid::nanoid!(4, &nanoid::alphabet::SAFE);
        let now = chrono::Local::now();
        let current_time = now.format("%Y%m%d");
        format!("{}-{}", current_time, id)
    }

    pub fn get_run_id(&self) -> String {
        self.run_id.clone().unwrap_or_else(Self::generate_run_id)
    }

    pub fn load_config(&self, run_id: &str) -> Result<FoundConfig> {
        let current_dir = std::env::current_dir();
        let working_dir = match (current_dir, &self.working_dir) {
            (_, Some(dir)) => PathBuf::from(&dir),
            (Ok(cwd), None) => cwd,
            _ => {
                error!(target: "user", "Unable to get a working dir");
                return Err(anyhow!("Unable to get a working dir"));
            }
        };

        let found_config = FoundConfig::new(working_dir, run_id);
        debug!("Loaded config {:?}", found_config);

        Ok(found_config)
    }
}

impl FoundConfig {
    pub fn new(working_dir: PathBuf, run_id: &str) -> Self {
        Self {
            working_dir,
            bin_path: std::env::var("PATH").unwrap_or_default(),
            run_id: run_id.to_string(),
        }
    }
}
