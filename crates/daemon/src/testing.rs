//! Scripted [`ProcessRunner`] for tests.

use crate::process::{ProcessError, ProcessRunner};
use std::path::PathBuf;
use std::process::Command;
use std::sync::Mutex;

/// One recorded invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Call {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl Call {
    fn from_command(cmd: &Command) -> Self {
        Self {
            program: cmd.get_program().to_string_lossy().into_owned(),
            args: cmd
                .get_args()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect(),
            cwd: cmd.get_current_dir().map(PathBuf::from),
        }
    }

    /// Program name, looking through a leading `sudo`
    pub fn tool(&self) -> &str {
        if self.program == "sudo" {
            self.args.first().map(String::as_str).unwrap_or("sudo")
        } else {
            &self.program
        }
    }
}

/// What the fake returns for a call
pub(crate) enum Reply {
    Output(String),
    Exit(i32),
}

type Handler = Box<dyn Fn(&Call) -> Reply + Send + Sync>;

/// Records every command and answers from a handler closure.
///
/// The handler may also touch the filesystem to simulate what the tool writes.
pub(crate) struct FakeRunner {
    calls: Mutex<Vec<Call>>,
    handler: Handler,
}

impl FakeRunner {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Call) -> Reply + Send + Sync + 'static,
    {
        Self {
            calls: Mutex::new(Vec::new()),
            handler: Box::new(handler),
        }
    }

    /// Every call succeeds with empty output
    pub fn succeeding() -> Self {
        Self::new(|_| Reply::Output(String::new()))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, tool: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.tool() == tool)
            .collect()
    }

    fn handle(&self, cmd: &Command) -> Result<String, ProcessError> {
        let call = Call::from_command(cmd);
        self.calls.lock().unwrap().push(call.clone());
        match (self.handler)(&call) {
            Reply::Output(output) => Ok(output),
            Reply::Exit(code) => Err(ProcessError::Failed {
                program: call.program,
                code,
                output: String::new(),
            }),
        }
    }
}

impl ProcessRunner for FakeRunner {
    fn capture(&self, cmd: Command) -> Result<String, ProcessError> {
        self.handle(&cmd)
    }

    fn stream(&self, cmd: Command) -> Result<(), ProcessError> {
        self.handle(&cmd).map(|_| ())
    }
}
