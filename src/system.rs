use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// An external command to run on the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Result of a finished command. Exit status is the only contract relied on;
/// output is only collected by [`CommandRunner::capture`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Port to the host's package manager, service manager and other tools.
pub trait CommandRunner {
    /// Run to completion with inherited stdio.
    fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput>;

    /// Run to completion, collecting stdout and stderr.
    fn capture(&self, invocation: &Invocation) -> io::Result<CommandOutput>;

    /// Locate an executable on the search path.
    fn find_program(&self, name: &str) -> Option<PathBuf>;
}

/// [`CommandRunner`] backed by real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput> {
        tracing::debug!(command = %invocation, "running");
        let status = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .status()?;
        tracing::debug!(command = %invocation, code = ?status.code(), "finished");
        Ok(CommandOutput {
            code: status.code(),
            ..CommandOutput::default()
        })
    }

    fn capture(&self, invocation: &Invocation) -> io::Result<CommandOutput> {
        tracing::debug!(command = %invocation, "capturing");
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .output()?;
        tracing::debug!(command = %invocation, code = ?output.status.code(), "finished");
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn find_program(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::collections::{HashMap, HashSet};

    /// Records every invocation; commands succeed unless told otherwise.
    #[derive(Debug, Default)]
    pub struct RecordingRunner {
        pub calls: RefCell<Vec<String>>,
        installed: HashSet<String>,
        failures: HashMap<String, i32>,
        outputs: HashMap<String, String>,
    }

    impl RecordingRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_program(mut self, name: &str) -> Self {
            self.installed.insert(name.to_string());
            self
        }

        /// Make the command whose rendered form is `command` exit with `code`.
        pub fn failing(mut self, command: &str, code: i32) -> Self {
            self.failures.insert(command.to_string(), code);
            self
        }

        pub fn with_output(mut self, command: &str, stdout: &str) -> Self {
            self.outputs.insert(command.to_string(), stdout.to_string());
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }

        fn finish(&self, invocation: &Invocation) -> CommandOutput {
            let rendered = invocation.to_string();
            self.calls.borrow_mut().push(rendered.clone());
            CommandOutput {
                code: Some(self.failures.get(&rendered).copied().unwrap_or(0)),
                stdout: self.outputs.get(&rendered).cloned().unwrap_or_default(),
                stderr: String::new(),
            }
        }
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, invocation: &Invocation) -> io::Result<CommandOutput> {
            Ok(self.finish(invocation))
        }

        fn capture(&self, invocation: &Invocation) -> io::Result<CommandOutput> {
            Ok(self.finish(invocation))
        }

        fn find_program(&self, name: &str) -> Option<PathBuf> {
            self.installed
                .contains(name)
                .then(|| PathBuf::from("/usr/sbin").join(name))
        }
    }
}
