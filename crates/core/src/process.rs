//! Blocking subprocess execution with cancellation.

use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Shared flag that asks running subprocesses to stop.
///
/// Clones share the same flag. Once cancelled it stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Run `command` to completion.
///
/// `stdin_text` is written to the child's stdin when given. stderr is
/// captured and included in the error on a non-zero exit. When `cancel`
/// fires, the child is killed and [`Error::Cancelled`] returned.
pub fn run(mut command: Command, stdin_text: Option<&str>, cancel: &CancelToken) -> Result<()> {
    let program = command.get_program().to_string_lossy().to_string();
    if cancel.is_cancelled() {
        return Err(Error::Cancelled { program });
    }

    command
        .stdin(if stdin_text.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    log::debug!("Running {:?}", command);
    let mut child = command.spawn().map_err(|e| Error::Subprocess {
        program: program.clone(),
        message: if e.kind() == std::io::ErrorKind::NotFound {
            "executable not found".to_string()
        } else {
            e.to_string()
        },
    })?;

    // stderr is drained on a side thread while stdin is fed and the child runs.
    let stderr_reader = child.stderr.take().map(|mut stderr| {
        std::thread::spawn(move || {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf);
            buf
        })
    });

    // A stdin write error is reported only when the child itself succeeded.
    let stdin_result = match (stdin_text, child.stdin.take()) {
        (Some(text), Some(mut stdin)) => stdin.write_all(text.as_bytes()),
        _ => Ok(()),
    };

    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if cancel.is_cancelled() {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::Cancelled { program });
        }
        std::thread::sleep(POLL_INTERVAL);
    };

    let stderr = stderr_reader
        .and_then(|h| h.join().ok())
        .unwrap_or_default();

    if !status.success() {
        let detail = stderr.trim();
        return Err(Error::Subprocess {
            program,
            message: if detail.is_empty() {
                format!("exited with {status}")
            } else {
                format!("exited with {status}: {detail}")
            },
        });
    }
    if let Err(e) = stdin_result {
        return Err(Error::Subprocess {
            program,
            message: format!("could not write stdin: {e}"),
        });
    }

    Ok(())
}

/// Remove `output` when `result` is an error, so no partial file survives.
pub fn discard_on_error<T>(output: &Path, result: Result<T>) -> Result<T> {
    if result.is_err() && output.exists() {
        log::debug!("Removing partial output {}", output.display());
        let _ = std::fs::remove_file(output);
    }
    result
}
