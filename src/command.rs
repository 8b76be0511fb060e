use core::fmt;
use std::{
    borrow::Cow,
    ffi::{OsStr, OsString},
    fmt::{Debug, Display},
    process::{ExitStatus, Stdio},
};

use stacked_errors::{bail_locationless, DisplayStr, Result, StackableErr};

use crate::{command_runner, CommandRunner};

/// What the command line looks like in logs and errors in place of a secret
pub const REDACTED: &str = "<redacted>";

/// An OS Command, this is `tokio::process::Command` wrapped with recording of
/// the standard streams and optional forwarding of them to this process.
///
/// Arguments added with [Command::secret_arg] have their value replaced by
/// [REDACTED] everywhere the command line is displayed.
#[derive(Clone)]
pub struct Command {
    /// The program to run.
    pub program: OsString,
    /// All the arguments that will be passed to the program
    pub args: Vec<OsString>,
    /// Indexes into `args` that are redacted in displayed command lines
    pub secret_args: Vec<usize>,
    /// Set to true by default, this enables recording of the `stdout` which can
    /// be accessed from `stdout` in the command result later
    pub stdout_recording: bool,
    /// Set to true by default, this enables recording of the `stderr` which can
    /// be accessed from `stderr` in the command result later
    pub stderr_recording: bool,
    /// Set to true by default, both streams are also recorded into one buffer
    /// in the order they arrive, see `combined` in the command result
    pub combined_recording: bool,
    /// Forward stdout to the current process stdout
    pub stdout_debug: bool,
    /// Forward stderr to the current process stderr
    pub stderr_debug: bool,
    /// If `false`, then killing the command on drop is enabled.
    pub forget_on_drop: bool,
}

impl Default for Command {
    fn default() -> Self {
        Self {
            program: Default::default(),
            args: Default::default(),
            secret_args: Default::default(),
            stdout_recording: true,
            stderr_recording: true,
            combined_recording: true,
            stdout_debug: Default::default(),
            stderr_debug: Default::default(),
            forget_on_drop: Default::default(),
        }
    }
}

impl Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "Command {{\nprogram: {:?}\n,",
            DisplayStr(&self.get_unified_command()),
        ))?;
        // potential accident cases
        if !(self.stdout_recording && self.stderr_recording) {
            f.write_fmt(format_args!(
                " recording: ({}, {}),",
                self.stdout_recording, self.stderr_recording
            ))?;
        }
        if self.stdout_debug || self.stderr_debug {
            f.write_fmt(format_args!(
                " debug: ({}, {}),",
                self.stdout_debug, self.stderr_debug
            ))?;
        }
        if self.forget_on_drop {
            f.write_fmt(format_args!(" forget_on_drop: true,"))?;
        }
        f.write_fmt(format_args!("}}",))
    }
}

impl Command {
    /// Creates a `Command` that only sets the `program` and `args` and leaves
    /// other things as their default values. `program_with_args` is separated
    /// by whitespace, the first part becomes the progam, and the the others
    /// are inserted as args.
    ///
    /// In case an argument has spaces, it should be added with [Command::arg]
    /// as an unbroken `&str`.
    pub fn new(program_with_args: impl AsRef<str>) -> Self {
        let mut program = String::new();
        let mut args: Vec<OsString> = vec![];
        for (i, part) in program_with_args.as_ref().split_whitespace().enumerate() {
            if i == 0 {
                part.clone_into(&mut program)
            } else {
                args.push(part.into());
            }
        }
        Self {
            program: program.into(),
            args,
            ..Default::default()
        }
    }

    /// Creates a new `Command` for launching the `program` with no
    /// preprocessing of the input like [Command::new] does.
    pub fn new_os_str(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().into(),
            ..Default::default()
        }
    }

    /// Adds an argument
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().into());
        self
    }

    /// Adds arguments to be passed to the program
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(args.into_iter().map(|s| s.as_ref().into()));
        self
    }

    /// Adds an argument that is passed as is but displayed redacted. For a
    /// `KEY=VALUE` argument only the value is hidden.
    pub fn secret_arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.secret_args.push(self.args.len());
        self.arg(arg)
    }

    /// Sets `stdout_debug` and `stderr_debug` for passing command standard
    /// streams to the standard streams of this process.
    pub fn debug(mut self, std_stream_debug: bool) -> Self {
        self.stdout_debug = std_stream_debug;
        self.stderr_debug = std_stream_debug;
        self
    }

    /// Gets the program and args interspersed with spaces, with the
    /// `secret_args` redacted
    pub fn get_unified_command(&self) -> String {
        let mut command = self.program.to_string_lossy().into_owned();
        for (i, arg) in self.args.iter().enumerate() {
            command += " ";
            let arg = arg.to_string_lossy();
            if self.secret_args.contains(&i) {
                if let Some((key, _)) = arg.split_once('=') {
                    command += key;
                    command += "=";
                }
                command += REDACTED;
            } else {
                command += arg.as_ref();
            }
        }
        command
    }

    /// Runs the command with a standard input, returning a `CommandRunner`
    pub async fn run_with_stdin<C: Into<Stdio>>(self, stdin_cfg: C) -> Result<CommandRunner> {
        command_runner(self, stdin_cfg).await
    }

    /// Calls [Command::run_with_stdin] with `Stdio::null()`
    pub async fn run(self) -> Result<CommandRunner> {
        self.run_with_stdin(Stdio::null()).await
    }

    /// Calls [Command::run] and waits for it to complete, returning the command
    /// result
    pub async fn run_to_completion(self) -> Result<CommandResult> {
        self.run()
            .await
            .stack_err_locationless("Command::run_to_completion")?
            .wait_with_output()
            .await
    }
}

/// The result of a [Command](crate::Command)
#[must_use]
#[derive(Clone, Default)]
pub struct CommandResult {
    // the command information is kept around for failures
    pub command: Command,
    pub status: Option<ExitStatus>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Both standard streams in the order their chunks were read
    pub combined: Vec<u8>,
}

impl Debug for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "CommandResult {{\ncommand: {:?},\nstatus: {:?},\n",
            self.command, self.status
        ))?;
        // move the commas out of the way of the stdout and stderr
        let stdout = self.stdout_as_utf8_lossy();
        if !stdout.is_empty() {
            f.write_fmt(format_args!("stdout: {}\n,", stdout))?;
        }
        let stderr = self.stderr_as_utf8_lossy();
        if !stderr.is_empty() {
            f.write_fmt(format_args!("stderr: {}\n,", stderr))?;
        }
        f.write_fmt(format_args!("}}"))
    }
}

impl Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:#?}", self))
    }
}

impl CommandResult {
    /// Returns if the command completed (not terminated early) with a
    /// successful return status
    pub fn successful(&self) -> bool {
        if let Some(status) = self.status.as_ref() {
            status.success()
        } else {
            false
        }
    }

    /// Returns a formatted error with relevant information if the command was
    /// not successful
    pub fn assert_success(&self) -> Result<()> {
        if let Some(status) = self.status.as_ref() {
            if status.success() {
                Ok(())
            } else {
                bail_locationless!("{self:#?}.assert_success() -> unsuccessful")
            }
        } else {
            bail_locationless!(
                "{self:#?}.assert_success() -> termination was called before completion"
            )
        }
    }

    /// Returns `String::from_utf8_lossy(&self.stdout)`
    pub fn stdout_as_utf8_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    /// Returns `String::from_utf8_lossy(&self.stderr)`
    pub fn stderr_as_utf8_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }
}
