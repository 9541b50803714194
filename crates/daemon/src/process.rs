//! Process runner for external tools
//!
//! Every external tool (probe, rip, copy, transcode, mount) is invoked through a
//! [`ProcessRunner`], either capturing its combined output or streaming it
//! line-by-line into the log. A non-zero exit is always reported as an error.

use log::info;
use std::io::{self, BufRead, BufReader, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use thiserror::Error;

/// Error type for external process execution
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The program could not be started
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Process exited with non-zero status
    #[error("{program} failed with exit code: {code}")]
    Failed {
        program: String,
        code: i32,
        output: String,
    },

    /// Process was terminated by signal
    #[error("{program} was terminated by signal")]
    Terminated { program: String },

    /// IO error while reading output
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs external commands.
///
/// Implementations are shared between the ingestion loop and the transcode
/// watcher, so they must be thread-safe.
pub trait ProcessRunner: Send + Sync {
    /// Run to completion and return stdout followed by stderr, trimmed.
    fn capture(&self, cmd: Command) -> Result<String, ProcessError>;

    /// Run to completion, logging every output line as it arrives.
    fn stream(&self, cmd: Command) -> Result<(), ProcessError>;
}

/// Name of the program a command runs, for logs and errors
pub fn program_name(cmd: &Command) -> String {
    cmd.get_program().to_string_lossy().into_owned()
}

/// Render a command as a single shell-like line for debug logs
pub fn describe(cmd: &Command) -> String {
    let mut line = program_name(cmd);
    for arg in cmd.get_args() {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }
    line
}

fn check_status(program: &str, status: ExitStatus, output: String) -> Result<(), ProcessError> {
    if status.success() {
        return Ok(());
    }
    match status.code() {
        Some(code) => Err(ProcessError::Failed {
            program: program.to_string(),
            code,
            output,
        }),
        None => Err(ProcessError::Terminated {
            program: program.to_string(),
        }),
    }
}

/// [`ProcessRunner`] backed by real child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn capture(&self, mut cmd: Command) -> Result<String, ProcessError> {
        let program = program_name(&cmd);
        log::debug!("Executing: {}", describe(&cmd));

        let output = cmd
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ProcessError::Spawn {
                program: program.clone(),
                source,
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        let combined = combined.trim().to_string();

        check_status(&program, output.status, combined.clone())?;
        Ok(combined)
    }

    fn stream(&self, mut cmd: Command) -> Result<(), ProcessError> {
        let program = program_name(&cmd);
        log::debug!("Executing: {}", describe(&cmd));

        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: program.clone(),
                source,
            })?;

        // stderr gets its own thread so neither pipe can fill up and block the child
        let stderr_log = child.stderr.take().map(|stderr| {
            let program = program.clone();
            thread::spawn(move || log_lines(&program, stderr))
        });

        if let Some(stdout) = child.stdout.take() {
            log_lines(&program, stdout);
        }
        if let Some(handle) = stderr_log {
            let _ = handle.join();
        }

        let status = child.wait()?;
        check_status(&program, status, String::new())
    }
}

/// Log every line of `reader` until EOF.
///
/// Lines need not be UTF-8. The pipe is drained to the end even after a read
/// error, otherwise the child would die of SIGPIPE on its next write.
fn log_lines<R: Read>(program: &str, reader: R) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end();
                if !line.trim().is_empty() {
                    info!("{}: {}", program, line);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                log::debug!("Reading {} output failed, discarding the rest: {}", program, e);
                let _ = io::copy(&mut reader, &mut io::sink());
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_joins_program_and_args() {
        let mut cmd = Command::new("blkid");
        cmd.arg("/dev/sr0");
        assert_eq!(describe(&cmd), "blkid /dev/sr0");
        assert_eq!(program_name(&cmd), "blkid");
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_returns_combined_output() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo out; echo err 1>&2");
        let output = SystemRunner.capture(cmd).unwrap();
        assert!(output.contains("out"));
        assert!(output.contains("err"));
    }

    #[cfg(unix)]
    #[test]
    fn test_capture_reports_exit_code() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo nope; exit 3");
        match SystemRunner.capture(cmd) {
            Err(ProcessError::Failed { code, output, .. }) => {
                assert_eq!(code, 3);
                assert_eq!(output, "nope");
            }
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_stream_reports_exit_code() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo line one; echo line two 1>&2; exit 1");
        assert!(matches!(
            SystemRunner.stream(cmd),
            Err(ProcessError::Failed { code: 1, .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_stream_survives_non_utf8_output() {
        // a Latin-1 title followed by more than a pipe buffer of output
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg("printf 'Caf\\351\\n'; head -c 200000 /dev/zero | tr '\\0' x; echo; exit 0");
        assert!(SystemRunner.stream(cmd).is_ok());
    }

    #[test]
    fn test_log_lines_reads_to_eof_past_invalid_utf8() {
        let mut input = b"ok\n".to_vec();
        input.extend_from_slice(b"Caf\xe9\n");
        input.extend(std::iter::repeat(b'x').take(100_000));
        let mut reader = io::Cursor::new(input);
        log_lines("test", &mut reader);
        assert_eq!(reader.position(), 3 + 5 + 100_000);
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let cmd = Command::new("definitely-not-a-real-tool-4711");
        assert!(matches!(
            SystemRunner.capture(cmd),
            Err(ProcessError::Spawn { .. })
        ));
    }
}
