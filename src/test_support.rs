//! Test support utilities shared across unit and integration tests.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::ffi::OsString;
use std::rc::Rc;

use crate::instance::{CommandOutput, CommandRunner, InstanceError, InstanceFuture, TargetInstance};

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Rc<RefCell<VecDeque<CommandOutput>>>,
    invocations: Rc<RefCell<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }

    /// Pushes a successful exit status with no output.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a specific exit code with no output.
    pub fn push_exit_code(&self, code: i32) {
        self.push_output(Some(code), "", "");
    }

    /// Pushes a response with no exit code to simulate abnormal termination.
    pub fn push_missing_exit_code(&self) {
        self.push_output(None, "", "");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(&self, code: Option<i32>, stdout: impl Into<String>, stderr: impl Into<String>) {
        self.responses.borrow_mut().push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, InstanceError> {
        self.invocations.borrow_mut().push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| InstanceError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

#[derive(Debug, Default)]
struct FakeState {
    exec: HashMap<String, CommandOutput>,
    shell: HashMap<String, CommandOutput>,
    files: HashMap<String, String>,
    boot_log: String,
    next_boot_log: Option<String>,
    next_files: HashMap<String, String>,
    shell_history: Vec<String>,
    cleans: u32,
    restarts: u32,
}

/// In-memory [`TargetInstance`] with keyed responses and staged reboots.
///
/// Outputs are keyed by the space-joined argv (for [`TargetInstance::execute`])
/// or the raw shell line (for [`TargetInstance::execute_shell`]). Content
/// staged with [`FakeInstance::stage_boot_log`] or [`FakeInstance::stage_file`]
/// becomes visible only after a restart, which lets tests model
/// reconciliation across reboots.
#[derive(Debug, Default)]
pub struct FakeInstance {
    state: RefCell<FakeState>,
}

impl FakeInstance {
    /// Creates an empty fake with no scripted responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the stdout of an argv-style command (exit code zero).
    pub fn set_exec_stdout(&self, args: &[&str], stdout: impl Into<String>) {
        self.state.borrow_mut().exec.insert(
            args.join(" "),
            CommandOutput {
                code: Some(0),
                stdout: stdout.into(),
                stderr: String::new(),
            },
        );
    }

    /// Scripts the full output of a raw shell line.
    pub fn set_shell_output(&self, command: &str, output: CommandOutput) {
        self.state
            .borrow_mut()
            .shell
            .insert(command.to_owned(), output);
    }

    /// Sets the current contents of a readable file.
    pub fn set_file(&self, path: &str, contents: impl Into<String>) {
        self.state
            .borrow_mut()
            .files
            .insert(path.to_owned(), contents.into());
    }

    /// Sets the current boot log contents.
    pub fn set_boot_log(&self, contents: impl Into<String>) {
        self.state.borrow_mut().boot_log = contents.into();
    }

    /// Stages boot log contents that appear after the next restart.
    pub fn stage_boot_log(&self, contents: impl Into<String>) {
        self.state.borrow_mut().next_boot_log = Some(contents.into());
    }

    /// Stages file contents that appear after the next restart.
    pub fn stage_file(&self, path: &str, contents: impl Into<String>) {
        self.state
            .borrow_mut()
            .next_files
            .insert(path.to_owned(), contents.into());
    }

    /// Returns every raw shell line executed so far.
    #[must_use]
    pub fn shell_history(&self) -> Vec<String> {
        self.state.borrow().shell_history.clone()
    }

    /// Number of times [`TargetInstance::clean`] was invoked.
    #[must_use]
    pub fn cleans(&self) -> u32 {
        self.state.borrow().cleans
    }

    /// Number of times [`TargetInstance::restart`] was invoked.
    #[must_use]
    pub fn restarts(&self) -> u32 {
        self.state.borrow().restarts
    }
}

impl TargetInstance for FakeInstance {
    fn execute(&self, args: &[&str]) -> Result<CommandOutput, InstanceError> {
        let key = args.join(" ");
        Ok(self
            .state
            .borrow()
            .exec
            .get(&key)
            .cloned()
            .unwrap_or(CommandOutput {
                code: Some(2),
                stdout: String::new(),
                stderr: String::new(),
            }))
    }

    fn execute_shell(&self, command: &str) -> Result<CommandOutput, InstanceError> {
        let mut state = self.state.borrow_mut();
        state.shell_history.push(command.to_owned());
        Ok(state.shell.get(command).cloned().unwrap_or(CommandOutput {
            code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        }))
    }

    fn read_from_file(&self, path: &str) -> Result<String, InstanceError> {
        self.state.borrow().files.get(path).cloned().ok_or_else(|| {
            InstanceError::CommandFailure {
                command: format!("sudo cat {path}"),
                status: Some(1),
                status_text: String::from("1"),
                stderr: format!("cat: {path}: No such file or directory"),
            }
        })
    }

    fn boot_log(&self) -> Result<String, InstanceError> {
        Ok(self.state.borrow().boot_log.clone())
    }

    fn clean(&self) -> Result<(), InstanceError> {
        self.state.borrow_mut().cleans += 1;
        Ok(())
    }

    fn restart(&self) -> InstanceFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state.borrow_mut();
            state.restarts += 1;
            if let Some(log) = state.next_boot_log.take() {
                state.boot_log = log;
            }
            let staged: Vec<(String, String)> = state.next_files.drain().collect();
            for (path, contents) in staged {
                state.files.insert(path, contents);
            }
            Ok(())
        })
    }
}
