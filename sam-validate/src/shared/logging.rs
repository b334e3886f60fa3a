use clap::{ArgGroup, Parser, ValueEnum};
use indicatif::ProgressStyle;
use lazy_static::lazy_static;
use std::fs::File;
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use tracing::level_filters::LevelFilter;
use tracing_indicatif::filter::{hide_indicatif_span_fields, IndicatifFilter};
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::fmt::format::DefaultFields;
use tracing_subscriber::{filter::filter_fn, prelude::*};
use tracing_subscriber::{
    fmt::format::{Format, PrettyFields},
    Registry,
};

pub const LOG_DIR: &str = "/tmp/sam-validate";

pub fn default_progress_bar() -> ProgressStyle {
    ProgressStyle::with_template(
        "{span_child_prefix} {spinner:.green} {wide_msg} {pos:>7}/{len:7} [{elapsed_precise}]",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("##-")
}

#[derive(Parser, Debug)]
#[clap(group = ArgGroup::new("logging"))]
pub struct LoggingOpts {
    /// A level of verbosity, and can be used multiple times
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[arg(long, default_value = "auto", env = "SAM_VALIDATE_OUTPUT_PROGRESS")]
    /// Set the progress output. Use plain to disable updating UI.
    pub progress: LoggingProgress,

    #[arg(skip = LevelFilter::WARN)]
    default_level: LevelFilter,
}

#[derive(ValueEnum, Debug, Copy, Clone)]
pub enum LoggingProgress {
    /// Determine output format based on execution context
    Auto,
    /// Standard output, no progress bar, no auto-updating output.
    Plain,
    /// Use progress bar
    Tty,
}

impl LoggingProgress {
    fn is_tty(&self) -> bool {
        match self {
            LoggingProgress::Auto => std::io::stdout().is_terminal(),
            LoggingProgress::Plain => false,
            LoggingProgress::Tty => true,
        }
    }
}

lazy_static! {
    /// Writer used to relay validator output. Holding the lock while writing
    /// keeps one invocation's block together.
    pub static ref STDOUT_WRITER: Arc<RwLock<Box<dyn Write + Sync + Send>>> =
        Arc::new(RwLock::new(Box::new(std::io::stdout())));
}

impl LoggingOpts {
    pub fn to_level_filter(&self) -> LevelFilter {
        match self.verbose {
            0 => self.default_level,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }

    /// A hook run leaves nothing behind unless `-v` was given.
    pub fn writes_log_file(&self) -> bool {
        self.verbose > 0
    }

    pub fn log_file_name(run_id: &str) -> String {
        format!("{}/sam-validate-{}.log", LOG_DIR, run_id)
    }

    /// Returns the file log guard and location when a log file is written.
    pub async fn configure_logging(
        &self,
        run_id: &str,
    ) -> anyhow::Result<Option<(tracing_appender::non_blocking::WorkerGuard, String)>> {
        let (file_output, file_log) = if self.writes_log_file() {
            let full_file_name = Self::log_file_name(run_id);
            std::fs::create_dir_all(LOG_DIR)?;

            let file_path = PathBuf::from(&full_file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(
                strip_ansi_escapes::Writer::new(File::create(file_path)?),
            );

            let file_output = tracing_subscriber::fmt::layer()
                .event_format(Format::default().pretty())
                .with_ansi(false)
                .with_writer(non_blocking);
            (Some(file_output), Some((guard, full_file_name)))
        } else {
            (None, None)
        };

        let indicatif_layer = IndicatifLayer::new()
            .with_span_field_formatter(hide_indicatif_span_fields(DefaultFields::new()))
            .with_progress_style(default_progress_bar());
        let indicatif_writer = indicatif_layer.get_stdout_writer();

        *STDOUT_WRITER.write().await = Box::new(indicatif_layer.get_stdout_writer());

        let is_tty_output = self.progress.is_tty();

        let level_filter = self.to_level_filter();
        let console_output = tracing_subscriber::fmt::layer()
            .event_format(
                Format::default()
                    .with_target(false)
                    .without_time()
                    .compact(),
            )
            .with_writer(indicatif_writer)
            .fmt_fields(PrettyFields::new())
            .with_filter(filter_fn(move |metadata| match metadata.target() {
                "user" => level_filter >= *metadata.level(),
                "always" => true,
                "progress" => !is_tty_output,
                _ => false,
            }));

        let progress_layer = if is_tty_output {
            Some(indicatif_layer.with_filter(IndicatifFilter::new(false)))
        } else {
            None
        };

        let subscriber = Registry::default()
            .with(console_output)
            .with(progress_layer)
            .with(file_output);

        tracing::subscriber::set_global_default(subscriber)?;

        Ok(file_log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[clap(flatten)]
        logging: LoggingOpts,
    }

    #[test]
    fn test_verbosity_maps_to_levels() {
        let levels: Vec<_> = ["prog", "prog -v", "prog -vv", "prog -vvvv"]
            .iter()
            .map(|args| {
                TestCli::parse_from(args.split(' '))
                    .logging
                    .to_level_filter()
            })
            .collect();

        assert_eq!(
            vec![
                LevelFilter::WARN,
                LevelFilter::INFO,
                LevelFilter::DEBUG,
                LevelFilter::TRACE
            ],
            levels
        );
    }

    #[test]
    fn test_log_file_only_when_verbose() {
        let quiet = TestCli::parse_from(["prog"]).logging;
        let verbose = TestCli::parse_from(["prog", "-v"]).logging;

        assert!(!quiet.writes_log_file());
        assert!(verbose.writes_log_file());
        assert_eq!(
            "/tmp/sam-validate/sam-validate-abc.log",
            LoggingOpts::log_file_name("abc")
        );
    }
}
