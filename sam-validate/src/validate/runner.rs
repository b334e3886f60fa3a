use super::command::CommandInvocation;
use super::error::RunnerError;
use crate::shared::prelude::{
    CaptureError, CaptureOpts, ExecutionProvider, FoundConfig, OutputCapture, STDOUT_WRITER,
};
use colored::Colorize;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info_span, warn, Instrument};
use tracing_indicatif::span_ext::IndicatifSpanExt;

const EXIT_TIMEOUT: i32 = 124;
const EXIT_NOT_EXECUTABLE: i32 = 126;
const EXIT_NOT_FOUND: i32 = 127;
const EXIT_SIGNAL_BASE: i32 = 128;

/// Outcome of one validator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub invocation: CommandInvocation,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecutionResult {
    fn from_capture(invocation: CommandInvocation, capture: &OutputCapture) -> Self {
        let exit_code = match (capture.exit_code, capture.signal) {
            (Some(code), _) => code,
            (None, Some(signal)) => EXIT_SIGNAL_BASE + signal,
            (None, None) => 1,
        };

        Self {
            invocation,
            stdout: capture.get_stdout(),
            stderr: capture.get_stderr(),
            exit_code,
        }
    }

    fn from_error(invocation: CommandInvocation, error: &CaptureError) -> Self {
        let exit_code = match error {
            CaptureError::MissingExecutable { .. } => EXIT_NOT_FOUND,
            CaptureError::Timeout { .. } => EXIT_TIMEOUT,
            CaptureError::Spawn { source, .. } if source.kind() == ErrorKind::NotFound => {
                EXIT_NOT_FOUND
            }
            CaptureError::Spawn { .. } => EXIT_NOT_EXECUTABLE,
            CaptureError::IoError { .. } => 1,
        };

        Self {
            invocation,
            stdout: String::new(),
            stderr: error.to_string(),
            exit_code,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// The first non-zero code in input order, or zero when everything passed.
pub fn representative_exit_code<I>(codes: I) -> i32
where
    I: IntoIterator<Item = i32>,
{
    codes.into_iter().find(|code| *code != 0).unwrap_or(0)
}

pub fn effective_pool_size(requested: usize, invocations: usize) -> usize {
    let size = match requested {
        0 => invocations,
        n => n.min(invocations),
    };
    size.max(1)
}

/// Writes one invocation's output as a single block.
pub fn write_result(writer: &mut dyn Write, result: &ExecutionResult) -> std::io::Result<()> {
    if result.is_success() {
        writeln!(writer, "{}", result.stdout)?;
    } else {
        writeln!(writer, "{} {}", "Command failed:".red().bold(), result.invocation)?;
        if !result.stdout.is_empty() {
            writeln!(writer, "{}", result.stdout)?;
        }
    }

    if !result.stderr.is_empty() {
        writeln!(writer, "{}", result.stderr)?;
    }
    writer.flush()
}

pub type SharedWriter = Arc<RwLock<Box<dyn Write + Sync + Send>>>;

async fn print_result(writer: &SharedWriter, result: &ExecutionResult) {
    let mut writer = writer.write().await;
    if let Err(e) = write_result(&mut **writer, result) {
        warn!("Unable to print output of `{}`: {:?}", result.invocation, e);
    }
}

fn is_resource_exhaustion(error: &std::io::Error) -> bool {
    matches!(error.kind(), ErrorKind::OutOfMemory | ErrorKind::WouldBlock)
        || matches!(error.raw_os_error(), Some(libc::ENFILE) | Some(libc::EMFILE))
}

struct Worker {
    provider: Arc<dyn ExecutionProvider>,
    writer: SharedWriter,
    working_dir: PathBuf,
    bin_path: String,
    timeout: Option<Duration>,
}

impl Worker {
    async fn run(&self, invocation: CommandInvocation) -> Result<ExecutionResult, RunnerError> {
        let capture = self
            .provider
            .run_command(CaptureOpts {
                working_dir: &self.working_dir,
                env_vars: Default::default(),
                path: &self.bin_path,
                program: invocation.program(),
                args: invocation.args(),
                timeout: self.timeout,
            })
            .await;

        let result = match capture {
            Ok(capture) => {
                debug!(
                    "`{}` finished in {}ms",
                    capture.command,
                    (capture.end_time - capture.start_time).num_milliseconds()
                );
                ExecutionResult::from_capture(invocation, &capture)
            }
            Err(CaptureError::Spawn { command, source }) if is_resource_exhaustion(&source) => {
                return Err(RunnerError::Spawn { command, source });
            }
            Err(e) => {
                error!("Unable to run `{}`: {:?}", invocation, e);
                ExecutionResult::from_error(invocation, &e)
            }
        };

        Ok(result)
    }
}

/// Runs validator commands as child processes on a bounded pool and
/// collects one result per command, in input order.
pub struct ParallelRunner {
    provider: Arc<dyn ExecutionProvider>,
    writer: SharedWriter,
    working_dir: PathBuf,
    bin_path: String,
    max_concurrency: usize,
    timeout: Option<Duration>,
}

impl ParallelRunner {
    pub fn new(found_config: &FoundConfig, provider: Arc<dyn ExecutionProvider>) -> Self {
        Self {
            provider,
            writer: STDOUT_WRITER.clone(),
            working_dir: found_config.working_dir.clone(),
            bin_path: found_config.bin_path.clone(),
            max_concurrency: 0,
            timeout: None,
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Sends validator output somewhere other than stdout.
    pub fn with_writer(mut self, writer: SharedWriter) -> Self {
        self.writer = writer;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs every invocation and waits for all of them. Output is printed as
    /// each one finishes, so blocks appear in completion order.
    pub async fn run(
        &self,
        invocations: Vec<CommandInvocation>,
    ) -> Result<Vec<ExecutionResult>, RunnerError> {
        let total = invocations.len();
        let pool_size = effective_pool_size(self.max_concurrency, total);
        debug!(target: "user", "Running {} command(s) on {} worker(s)", total, pool_size);

        let header_span = info_span!("sam validate", "indicatif.pb_show" = true);
        header_span.pb_set_length(total as u64);
        header_span.pb_set_message("sam validate");

        let worker = Arc::new(Worker {
            provider: Arc::clone(&self.provider),
            writer: Arc::clone(&self.writer),
            working_dir: self.working_dir.clone(),
            bin_path: self.bin_path.clone(),
            timeout: self.timeout,
        });
        let pool = Arc::new(Semaphore::new(pool_size));
        let mut workers = JoinSet::new();
        for (idx, invocation) in invocations.into_iter().enumerate() {
            let pool = Arc::clone(&pool);
            let worker = Arc::clone(&worker);
            let span = info_span!(
                parent: &header_span,
                "invocation",
                template = invocation.template().unwrap_or("<default>"),
                command = %invocation
            );

            workers.spawn(
                async move {
                    let _permit = pool.acquire_owned().await?;
                    let result = worker.run(invocation).await?;
                    print_result(&worker.writer, &result).await;
                    Ok::<_, RunnerError>((idx, result))
                }
                .instrument(span),
            );
        }

        let mut slots: Vec<Option<ExecutionResult>> = vec![None; total];
        let collect = async {
            while let Some(joined) = workers.join_next().await {
                match joined.map_err(RunnerError::from).and_then(|result| result) {
                    Ok((idx, result)) => {
                        header_span.pb_inc(1);
                        slots[idx] = Some(result);
                    }
                    Err(e) => {
                        workers.abort_all();
                        return Err(e);
                    }
                }
            }
            Ok(())
        };
        collect.instrument(header_span.clone()).await?;

        Ok(slots.into_iter().flatten().collect())
    }
}
