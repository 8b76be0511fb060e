use core::fmt;
use std::{fmt::Debug, process::Stdio, sync::Arc};

use stacked_errors::{Result, StackableErr};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    process::{self, Child},
    sync::Mutex,
    task::{self, JoinHandle},
};
use tracing::warn;

use crate::{next_terminal_color, Command, CommandResult};

type Record = Arc<Mutex<Vec<u8>>>;

/// Used as the engine in the stdout and stderr recording tasks. `unwrap`s only
/// are used in here because it is spawned as a separate task.
async fn recorder<R: AsyncRead + Unpin, W: AsyncWrite + Unpin>(
    mut std_read: BufReader<R>,
    std_records: Vec<Record>,
    // write point and prefix
    mut std_forward: Option<(W, String)>,
) {
    const FORWARDING_FAILED: &str =
        "`ansibleapp::Command` stdout or stderr forwarding failed on write";
    // if the previous read had a newline on the end (for forwarding)
    let mut previous_newline = false;
    // if no bytes have been written (for forwarding)
    let mut empty = true;
    let mut line_buf = Vec::new();
    // 8 KB, like BufReader
    let mut buf = [0u8; 8 * 1024];
    loop {
        let bytes_read = match std_read.read(&mut buf).await {
            Ok(bytes_read) => bytes_read,
            Err(e) => {
                panic!("`ansibleapp::Command` stdout or stderr recording failed on read: {e}")
            }
        };
        if bytes_read == 0 {
            // if there has been nonempty output with no ending newline insert one upon
            // completion
            if (!empty) && (!previous_newline) {
                if let Some((ref mut std_forward, _)) = std_forward {
                    std_forward.write_all(b"\n").await.expect(FORWARDING_FAILED);
                    std_forward.flush().await.unwrap();
                }
            }
            break
        }
        let bytes = &buf[..bytes_read];
        for record in &std_records {
            record.lock().await.extend_from_slice(bytes);
        }
        if let Some((ref mut std_forward, ref prefix)) = std_forward {
            // invalid sequences become replacement characters, cut up codepoints across
            // reads are rare enough to accept that
            for line in bstr::ByteSlice::lines_with_terminator(bytes) {
                // the prefix is written together with the line, otherwise stdout running
                // into stderr is too common
                if empty || previous_newline {
                    line_buf.extend_from_slice(prefix.as_bytes());
                }
                previous_newline = line.last() == Some(&b'\n');
                line_buf.extend_from_slice(bstr::ByteSlice::to_str_lossy(line).as_bytes());
                std_forward
                    .write_all(&line_buf)
                    .await
                    .expect(FORWARDING_FAILED);
                line_buf.clear();
                empty = false;
            }
            // if set excessively large by some single line, shrink
            if line_buf.capacity() > (8 * 1024) {
                line_buf.shrink_to_fit();
            }
            std_forward.flush().await.unwrap();
        }
    }
}

/// Spawned `Commands` are represented by this struct.
///
/// If the `tracing` crate is used and a subscriber is active, warnings from
/// bad `Drop`s can be issued
#[must_use]
pub struct CommandRunner {
    // this information is kept around for failures
    command: Option<Command>,
    child_process: Option<Child>,
    handles: Vec<JoinHandle<()>>,
    stdout_record: Record,
    stderr_record: Record,
    combined_record: Record,
}

impl Debug for CommandRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // don't try to display the records, leave that for the result
        f.debug_struct("CommandRunner")
            .field("command", &self.command)
            .field("child_process", &self.child_process)
            .field("handles", &self.handles)
            .finish()
    }
}

impl Drop for CommandRunner {
    fn drop(&mut self) {
        // we purposely parenthesize in this way to avoid calling `panicking` in the
        // normal case
        if self.child_process.is_some() && (!std::thread::panicking()) {
            warn!(
                "A `CommandRunner` was dropped without being properly finished, the program was: \
                 {}",
                self.command
                    .as_ref()
                    .map(|c| c.program.to_string_lossy().into_owned())
                    .unwrap_or_default()
            )
        }
    }
}

pub(crate) async fn command_runner<C: Into<Stdio>>(
    this: Command,
    stdin_cfg: C,
) -> Result<CommandRunner> {
    let mut cmd = process::Command::new(&this.program);
    let stdout_record = Record::default();
    let stderr_record = Record::default();
    let combined_record = Record::default();
    let mut stdout_records = vec![];
    let mut stderr_records = vec![];
    if this.stdout_recording {
        stdout_records.push(Arc::clone(&stdout_record));
    }
    if this.stderr_recording {
        stderr_records.push(Arc::clone(&stderr_record));
    }
    if this.combined_recording {
        stdout_records.push(Arc::clone(&combined_record));
        stderr_records.push(Arc::clone(&combined_record));
    }
    let program_name = this.program.to_string_lossy().into_owned();
    cmd.args(&this.args).kill_on_drop(!this.forget_on_drop);
    let mut child = cmd
        .stdin(stdin_cfg)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        // the program name only, arguments can carry secrets
        .stack_err_with_locationless(|| {
            format!("Command::run() -> failed to spawn child process for program {program_name:?}")
        })?;
    let child_id = child.id().unwrap_or_default();
    let terminal_color = if this.stdout_debug || this.stderr_debug {
        next_terminal_color()
    } else {
        owo_colors::AnsiColors::Default
    };
    let stdout_forward = if this.stdout_debug {
        let prefix = owo_colors::OwoColorize::color(
            &format!("{program_name} {child_id}  | "),
            terminal_color,
        )
        .to_string();
        Some((tokio::io::stdout(), prefix))
    } else {
        None
    };
    let stderr_forward = if this.stderr_debug {
        let prefix = owo_colors::OwoColorize::color(
            &format!("{program_name} {child_id} E| "),
            terminal_color,
        )
        .to_string();
        Some((tokio::io::stderr(), prefix))
    } else {
        None
    };
    let mut handles = vec![];
    // both pipes are always drained so that a chatty child cannot block on a full
    // pipe
    if let Some(stdout) = child.stdout.take() {
        handles.push(task::spawn(recorder(
            BufReader::new(stdout),
            stdout_records,
            stdout_forward,
        )));
    }
    if let Some(stderr) = child.stderr.take() {
        handles.push(task::spawn(recorder(
            BufReader::new(stderr),
            stderr_records,
            stderr_forward,
        )));
    }
    Ok(CommandRunner {
        command: Some(this),
        child_process: Some(child),
        handles,
        stdout_record,
        stderr_record,
        combined_record,
    })
}

impl CommandRunner {
    /// Returns the `pid` of the child process. Returns `None` if the command
    /// has finished or the internal `id` call returned `None`.
    pub fn pid(&self) -> Option<u32> {
        self.child_process.as_ref().and_then(|c| c.id())
    }

    /// Waits for the process and both recorders to finish (or stalls forever
    /// if the OS command does). Note: If this function succeeds, it only means
    /// that the OS calls all succeeded, it does not mean that the command
    /// itself had a successful return status, use `assert_success` or check
    /// the `status` on the `CommandResult`.
    pub async fn wait_with_output(mut self) -> Result<CommandResult> {
        let program = self
            .command
            .as_ref()
            .map(|c| c.program.clone())
            .unwrap_or_default();
        let status = self
            .child_process
            .take()
            .stack_err_locationless("`CommandRunner` has already been finished")?
            .wait()
            .await
            .stack_err_with_locationless(|| {
                format!("CommandRunner::wait_with_output() -> failed when waiting on {program:?}")
            })?;
        while let Some(handle) = self.handles.pop() {
            handle.await.stack_err_with_locationless(|| {
                format!(
                    "CommandRunner::wait_with_output() -> recorder task for {program:?} panicked"
                )
            })?;
        }
        let stdout = std::mem::take(&mut *self.stdout_record.lock().await);
        let stderr = std::mem::take(&mut *self.stderr_record.lock().await);
        let combined = std::mem::take(&mut *self.combined_record.lock().await);
        Ok(CommandResult {
            command: self.command.take().unwrap_or_default(),
            status: Some(status),
            stdout,
            stderr,
            combined,
        })
    }
}
