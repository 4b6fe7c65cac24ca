//! Helpers for running child processes without risking pipe deadlocks.
//!
//! Both modes drain stdout and stderr on two threads while the child runs.
//! There is no timeout: once a child starts, the caller blocks until it exits.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument};

const ANSI_RED: &str = "\x1b[31m";
const ANSI_RESET: &str = "\x1b[0m";

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// Exit code, or -1 when the child was terminated by a signal.
    pub fn exit_code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Run a command to completion and capture stdout/stderr in full.
///
/// `stdin` (if any) is fed from its own thread so a child that writes before
/// reading cannot stall the parent.
#[instrument(skip_all, fields(program = ?cmd.get_program(), stdin_bytes = stdin.map(<[u8]>::len)))]
pub fn run_captured(mut cmd: Command, stdin: Option<&[u8]>) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdin_handle = match stdin {
        Some(input) => {
            let mut child_stdin = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("stdin was not piped"))?;
            let input = input.to_vec();
            Some(thread::spawn(move || -> Result<()> {
                child_stdin.write_all(&input).context("write stdin")?;
                Ok(())
            }))
        }
        None => None,
    };

    let stdout_handle = thread::spawn(move || read_stream(stdout));
    let stderr_handle = thread::spawn(move || read_stream(stderr));

    let status = child.wait().context("wait for command")?;

    let stdout = join_reader(stdout_handle).context("join stdout")?;
    let stderr = join_reader(stderr_handle).context("join stderr")?;
    if let Some(handle) = stdin_handle {
        match handle.join() {
            Ok(Ok(())) => {}
            // A child that exits without reading all of stdin is not our failure.
            Ok(Err(err)) => debug!(err = %format!("{err:#}"), "stdin not fully consumed"),
            Err(_) => return Err(anyhow!("stdin writer thread panicked")),
        }
    }

    debug!(exit_code = ?status.code(), "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
    })
}

fn read_stream<R: Read>(mut reader: R) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).context("read output")?;
    Ok(buf)
}

fn join_reader(handle: thread::JoinHandle<Result<Vec<u8>>>) -> Result<Vec<u8>> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

/// Build the platform shell invocation for an ad hoc command string.
pub fn shell_command(command: &str, cwd: &Path) -> Command {
    let mut cmd = if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    };
    cmd.current_dir(cwd);
    cmd
}

/// Run a command, passing its output through line by line as it arrives.
///
/// stdout lines go to `out`; stderr lines go to `err`, wrapped in red when
/// `color_stderr` is set. Both streams are fully drained before the exit code
/// is returned.
#[instrument(skip_all, fields(program = ?cmd.get_program(), color_stderr = color_stderr))]
pub fn stream_command(
    mut cmd: Command,
    out: &mut (dyn Write + Send),
    err: &mut (dyn Write + Send),
    color_stderr: bool,
) -> Result<i32> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().context("spawn command")?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let color = color_stderr.then_some((ANSI_RED, ANSI_RESET));
    let (stdout_result, stderr_result) = thread::scope(|scope| {
        let stdout_handle = scope.spawn(move || pump_lines(stdout, out, None));
        let stderr_handle = scope.spawn(move || pump_lines(stderr, err, color));
        (stdout_handle.join(), stderr_handle.join())
    });
    stdout_result.map_err(|_| anyhow!("stdout pump thread panicked"))??;
    stderr_result.map_err(|_| anyhow!("stderr pump thread panicked"))??;

    let status = child.wait().context("wait for command")?;
    let code = status.code().unwrap_or(-1);
    debug!(exit_code = code, "streamed command finished");
    Ok(code)
}

fn pump_lines<R: Read>(
    reader: R,
    sink: &mut (dyn Write + Send),
    wrap: Option<(&str, &str)>,
) -> Result<()> {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line).context("read line")?;
        if n == 0 {
            break;
        }
        match wrap {
            Some((prefix, suffix)) => {
                sink.write_all(prefix.as_bytes())?;
                sink.write_all(&line)?;
                sink.write_all(suffix.as_bytes())?;
            }
            None => sink.write_all(&line)?,
        }
        sink.flush()?;
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captured_collects_both_streams_and_exit_code() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cmd = shell_command("echo out; echo err >&2; exit 3", temp.path());

        let output = run_captured(cmd, None).expect("run");
        assert_eq!(output.exit_code(), 3);
        assert_eq!(output.stdout_lossy(), "out\n");
        assert_eq!(output.stderr_lossy(), "err\n");
    }

    #[test]
    fn captured_feeds_stdin() {
        let temp = tempfile::tempdir().expect("tempdir");
        let output =
            run_captured(shell_command("cat", temp.path()), Some(b"prompt text")).expect("run");
        assert_eq!(output.stdout_lossy(), "prompt text");
    }

    #[test]
    fn captured_survives_large_stderr() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cmd = shell_command(
            "i=0; while [ $i -lt 20000 ]; do echo line-$i >&2; i=$((i+1)); done; echo done",
            temp.path(),
        );
        let output = run_captured(cmd, None).expect("run");
        assert_eq!(output.stdout_lossy(), "done\n");
        assert!(output.stderr.len() > 64 * 1024);
    }

    #[test]
    fn stream_passes_lines_through_and_colors_stderr() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut out = Vec::new();
        let mut err = Vec::new();

        let code = stream_command(
            shell_command("echo one; echo two; echo bad >&2; exit 4", temp.path()),
            &mut out,
            &mut err,
            true,
        )
        .expect("stream");

        assert_eq!(code, 4);
        assert_eq!(String::from_utf8(out).expect("utf8"), "one\ntwo\n");
        assert_eq!(
            String::from_utf8(err).expect("utf8"),
            format!("{ANSI_RED}bad\n{ANSI_RESET}")
        );
    }

    #[test]
    fn stream_preserves_shell_quoting() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut out = Vec::new();
        let mut err = Vec::new();

        let code = stream_command(
            shell_command("printf '%s|' 'a b' c", temp.path()),
            &mut out,
            &mut err,
            false,
        )
        .expect("stream");

        assert_eq!(code, 0);
        assert_eq!(String::from_utf8(out).expect("utf8"), "a b|c|");
        assert!(err.is_empty());
    }
}
