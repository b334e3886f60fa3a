use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_builder::Builder;
use mockall::automock;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, instrument, trace, warn};
use which::which_in;

#[derive(Clone, Default, Builder, Debug)]
#[builder(setter(into))]
pub struct OutputCapture {
    #[builder(default)]
    pub working_dir: PathBuf,
    #[builder(default)]
    stdout: Vec<(DateTime<Utc>, String)>,
    #[builder(default)]
    stderr: Vec<(DateTime<Utc>, String)>,
    #[builder(default)]
    pub exit_code: Option<i32>,
    /// Signal that terminated the process, when it did not exit on its own.
    #[builder(default)]
    pub signal: Option<i32>,
    #[builder(default)]
    pub start_time: DateTime<Utc>,
    #[builder(default)]
    pub end_time: DateTime<Utc>,
    #[builder(default)]
    pub command: String,
}

struct StreamCapture<R: io::AsyncRead + Unpin> {
    reader: R,
    stream: &'static str,
}

impl<R: io::AsyncRead + Unpin> StreamCapture<R> {
    /// Reads until EOF. Bytes that are not UTF-8 are replaced rather than
    /// failing the read, so the pipe is always drained.
    async fn capture_output(self) -> Vec<(DateTime<Utc>, String)> {
        let mut captured = Vec::new();
        let mut reader = BufReader::new(self.reader);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches('\n').trim_end_matches('\r');
                    trace!(stream = self.stream, "{}", line);
                    captured.push((Utc::now(), line.to_string()));
                }
                Err(e) => {
                    warn!(stream = self.stream, "Stopped reading output: {:?}", e);
                    break;
                }
            }
        }

        captured
    }
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Unable to process output. {error:?}")]
    IoError {
        #[from]
        error: std::io::Error,
    },
    #[error("File {name} was not executable or it did not exist.")]
    MissingExecutable { name: String },
    #[error("Unable to start `{command}`. {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("`{command}` did not finish within {seconds} seconds.")]
    Timeout { command: String, seconds: u64 },
}

#[automock]
#[async_trait]
pub trait ExecutionProvider: Send + Sync {
    async fn run_command<'a>(&self, opts: CaptureOpts<'a>) -> Result<OutputCapture, CaptureError>;
}

#[derive(Default, Debug)]
pub struct DefaultExecutionProvider {}

#[async_trait]
impl ExecutionProvider for DefaultExecutionProvider {
    async fn run_command<'a>(&self, opts: CaptureOpts<'a>) -> Result<OutputCapture, CaptureError> {
        OutputCapture::capture_output(opts).await
    }
}

pub struct CaptureOpts<'a> {
    pub working_dir: &'a Path,
    pub env_vars: BTreeMap<String, String>,
    pub path: &'a str,
    pub program: &'a str,
    pub args: &'a [String],
    pub timeout: Option<Duration>,
}

impl<'a> CaptureOpts<'a> {
    pub fn command(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program);
        parts.extend(self.args.iter().map(String::as_str));
        parts.join(" ")
    }
}

impl OutputCapture {
    #[instrument(skip_all, fields(command = %opts.command()))]
    pub async fn capture_output(opts: CaptureOpts<'_>) -> Result<Self, CaptureError> {
        let program = find_executable(&opts)?;
        let command_line = opts.command();

        debug!("Executing PATH={} {:?}", &opts.path, &command_line);

        let start_time = Utc::now();
        let mut command = tokio::process::Command::new(&program);
        let mut child = command
            .args(opts.args)
            .env("PATH", opts.path)
            .envs(&opts.env_vars)
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .stdout(Stdio::piped())
            .current_dir(opts.working_dir)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CaptureError::Spawn {
                command: command_line.clone(),
                source,
            })?;

        // capture stdout
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stdout = StreamCapture {
            reader: stdout,
            stream: "stdout",
        }
        .capture_output();

        // capture stderr
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;
        let stderr = StreamCapture {
            reader: stderr,
            stream: "stderr",
        }
        .capture_output();

        // wait for app to exit
        let finished = async { tokio::join!(child.wait(), stdout, stderr) };
        let (command_result, wait_stdout, wait_stderr) = match opts.timeout {
            None => finished.await,
            Some(limit) => match tokio::time::timeout(limit, finished).await {
                Ok(done) => done,
                Err(_) => {
                    // dropping the child kills it
                    return Err(CaptureError::Timeout {
                        command: command_line,
                        seconds: limit.as_secs(),
                    });
                }
            },
        };
        let end_time = Utc::now();
        debug!("join result {:?}", command_result);

        let status = command_result?;

        Ok(Self {
            working_dir: opts.working_dir.to_path_buf(),
            stdout: wait_stdout,
            stderr: wait_stderr,
            exit_code: status.code(),
            signal: status.signal(),
            start_time,
            end_time,
            command: command_line,
        })
    }

    pub fn get_stdout(&self) -> String {
        self.stdout
            .iter()
            .map(|(_, line)| line.clone())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn get_stderr(&self) -> String {
        self.stderr
            .iter()
            .map(|(_, line)| line.clone())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn missing_pipe(name: &str) -> CaptureError {
    CaptureError::IoError {
        error: std::io::Error::other(format!("{} was not captured", name)),
    }
}

fn find_executable(opts: &CaptureOpts) -> Result<PathBuf, CaptureError> {
    let path = match which_in(opts.program, Some(OsString::from(opts.path)), opts.working_dir) {
        Ok(path) => path,
        Err(e) => {
            debug!("Unable to find binary {:?}", e);
            return Err(CaptureError::MissingExecutable {
                name: opts.program.to_string(),
            });
        }
    };

    let metadata = std::fs::metadata(&path).map_err(|_| CaptureError::MissingExecutable {
        name: path.display().to_string(),
    })?;
    if !metadata.is_file() || metadata.permissions().mode() & 0o111 == 0 {
        return Err(CaptureError::MissingExecutable {
            name: path.display().to_string(),
        });
    }

    Ok(path)
}
