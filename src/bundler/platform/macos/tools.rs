//! External tool invocation.
//!
//! Every Xcode tool this crate drives (`lipo`, `codesign`, `security`,
//! `xcrun notarytool`, `xcrun stapler`, `ditto`, `hdiutil`, `pkgbuild`,
//! `productbuild`) is reached through [`ToolRunner`], so the stages can be
//! exercised against a recording fake instead of a real toolchain.

use crate::bundler::error::{Error, Result};
use std::{
    ffi::{OsStr, OsString},
    future::Future,
    process::Stdio,
};

/// A single external program invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<OsString>,
    interactive: bool,
}

impl Invocation {
    /// Starts an invocation of `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            interactive: false,
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Lets the tool talk to the terminal directly (stdin/stdout/stderr inherited).
    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Arguments as lossy UTF-8 strings.
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    /// Human-readable command line, used in error messages.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.clone())
            .chain(self.args_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished tool.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// A successful run with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed run with the given exit code and stderr.
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    /// Converts a non-zero exit into [`Error::ToolExit`].
    pub fn check(self, invocation: &Invocation) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::ToolExit {
                command: invocation.command_line(),
                code: self.code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Capability to run an external program and capture its output.
///
/// A non-zero exit is *not* an `Err`: callers decide which exit codes are
/// fatal, tolerated or retryable. `Err` is reserved for failing to launch.
pub trait ToolRunner: Send + Sync + 'static {
    fn run(&self, invocation: &Invocation) -> impl Future<Output = Result<ToolOutput>> + Send;
}

/// Runs tools as child processes of this one.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemToolRunner;

impl ToolRunner for SystemToolRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ToolOutput> {
        log::debug!("Running: {}", invocation.command_line());

        let mut command = tokio::process::Command::new(invocation.program());
        command.args(invocation.arguments()).kill_on_drop(true);

        if invocation.is_interactive() {
            command
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
            let status = command.status().await.map_err(|e| launch_error(invocation, e))?;
            return Ok(ToolOutput {
                code: status.code(),
                ..Default::default()
            });
        }

        let output = command
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| launch_error(invocation, e))?;

        Ok(ToolOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

fn launch_error(invocation: &Invocation, error: std::io::Error) -> Error {
    if error.kind() == std::io::ErrorKind::NotFound {
        Error::ToolNotFound {
            tool: invocation.program().to_string(),
        }
    } else {
        Error::GenericError(format!(
            "Failed to execute {}: {}",
            invocation.program(),
            error
        ))
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Recording stand-in for the Xcode toolchain.

    use super::*;
    use std::{
        collections::{BTreeSet, VecDeque},
        path::{Path, PathBuf},
        sync::Mutex,
    };

    type Handler = Box<dyn Fn(&Invocation) -> Result<ToolOutput> + Send + Sync>;

    /// Records every invocation. Replies come from the scripted queue first,
    /// then from the handler, then default to an empty success.
    #[derive(Default)]
    pub struct FakeRunner {
        calls: Mutex<Vec<Invocation>>,
        scripted: Mutex<VecDeque<Result<ToolOutput>>>,
        handler: Option<Handler>,
    }

    impl FakeRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_handler(
            handler: impl Fn(&Invocation) -> Result<ToolOutput> + Send + Sync + 'static,
        ) -> Self {
            Self {
                handler: Some(Box::new(handler)),
                ..Self::default()
            }
        }

        /// Queues the reply for the next unanswered invocation.
        pub fn push(&self, reply: ToolOutput) {
            self.scripted.lock().unwrap().push_back(Ok(reply));
        }

        pub fn calls(&self) -> Vec<Invocation> {
            self.calls.lock().unwrap().clone()
        }

        /// Every call rendered as `program arg arg ...`.
        pub fn command_lines(&self) -> Vec<String> {
            self.calls().iter().map(Invocation::command_line).collect()
        }
    }

    impl ToolRunner for FakeRunner {
        async fn run(&self, invocation: &Invocation) -> Result<ToolOutput> {
            self.calls.lock().unwrap().push(invocation.clone());
            if let Some(reply) = self.scripted.lock().unwrap().pop_front() {
                return reply;
            }
            match &self.handler {
                Some(handler) => handler(invocation),
                None => Ok(ToolOutput::success("")),
            }
        }
    }

    /// Models a Mach-O file as a text file listing its slices, one per line,
    /// and answers `lipo -create`, `-info` and `-thin` against that model.
    pub fn fake_lipo(invocation: &Invocation) -> Result<ToolOutput> {
        if invocation.program() != "lipo" {
            return Ok(ToolOutput::success(""));
        }
        let args: Vec<PathBuf> = invocation.arguments().iter().map(PathBuf::from).collect();
        let flag = args.first().and_then(|a| a.to_str()).unwrap_or_default();
        match flag {
            "-create" => {
                let output = &args[2];
                let mut slices = BTreeSet::new();
                for input in &args[3..] {
                    slices.extend(read_slices(input));
                }
                write_slices(output, slices.iter().map(String::as_str));
                Ok(ToolOutput::success(""))
            }
            "-info" => {
                let path = &args[1];
                let slices = read_slices(path);
                let stdout = if slices.len() == 1 {
                    format!(
                        "Non-fat file: {} is architecture: {}\n",
                        path.display(),
                        slices[0]
                    )
                } else {
                    format!(
                        "Architectures in the fat file: {} are: {}\n",
                        path.display(),
                        slices.join(" ")
                    )
                };
                Ok(ToolOutput::success(stdout))
            }
            "-thin" => {
                let arch = args[1].to_string_lossy().into_owned();
                let output = &args[3];
                let input = &args[4];
                if read_slices(input).contains(&arch) {
                    write_slices(output, [arch.as_str()]);
                    Ok(ToolOutput::success(""))
                } else {
                    Ok(ToolOutput::failure(1, "fatal error: lipo: input file does not contain the specified architecture"))
                }
            }
            _ => Ok(ToolOutput::failure(1, "unknown lipo flag")),
        }
    }

    pub fn read_slices(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn write_slices<'a>(path: &Path, slices: impl IntoIterator<Item = &'a str>) {
        let body: Vec<&str> = slices.into_iter().collect();
        std::fs::write(path, body.join("\n")).unwrap();
    }
}
