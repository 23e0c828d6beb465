//! The external executables the workflow relies on and their argument shapes.

use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::process::ProcessInvocation;

/// A program plus leading arguments, e.g. `python -m pip`
///
/// Deserializes from either a string (split on whitespace) or a list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "CommandRepr")]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CommandRepr {
    Line(String),
    Words(Vec<String>),
}

impl TryFrom<CommandRepr> for CommandSpec {
    type Error = String;

    fn try_from(repr: CommandRepr) -> Result<Self, Self::Error> {
        let words = match repr {
            CommandRepr::Line(line) => line.split_whitespace().map(String::from).collect(),
            CommandRepr::Words(words) => words,
        };
        CommandSpec::from_words(words).ok_or_else(|| "command must not be empty".to_string())
    }
}

impl CommandSpec {
    /// A bare program with no leading arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append a leading argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Parse a whitespace-separated command line (no quoting rules)
    pub fn parse(line: &str) -> Option<Self> {
        Self::from_words(line.split_whitespace().map(String::from).collect())
    }

    fn from_words(mut words: Vec<String>) -> Option<Self> {
        if words.is_empty() || words[0].is_empty() {
            return None;
        }
        let program = words.remove(0);
        Some(Self {
            program,
            args: words,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Start an invocation of this command
    pub fn invocation(&self) -> ProcessInvocation {
        ProcessInvocation::new(&self.program).args(self.args.iter().cloned())
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.invocation().command_line())
    }
}

/// Runtime, package manager, launcher and the package they serve
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    /// Interpreter queried with `--version`
    pub runtime: CommandSpec,

    /// Package manager used for `show` and `install`
    pub package_manager: CommandSpec,

    /// Launcher that runs a script given its path
    pub launcher: CommandSpec,

    /// Companion package name
    pub package: String,

    /// Resolve the package manager through the shell
    pub package_manager_shell: bool,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            runtime: CommandSpec::new("python"),
            package_manager: CommandSpec::new("pip"),
            launcher: CommandSpec::new("renzmc"),
            package: "renzmc".to_string(),
            package_manager_shell: false,
        }
    }
}

impl Toolchain {
    /// `python --version`
    pub fn runtime_version(&self) -> ProcessInvocation {
        self.runtime.invocation().arg("--version")
    }

    /// `pip show <name>`
    pub fn package_info(&self, name: &str) -> ProcessInvocation {
        self.package_manager
            .invocation()
            .args(["show", name])
            .with_shell(self.package_manager_shell)
    }

    /// `pip install <name>`
    pub fn package_install(&self, name: &str) -> ProcessInvocation {
        self.package_manager
            .invocation()
            .args(["install", name])
            .with_shell(self.package_manager_shell)
    }

    /// `renzmc <path>`
    pub fn launch(&self, script: &Path) -> ProcessInvocation {
        self.launcher
            .invocation()
            .arg(script.to_string_lossy().into_owned())
    }

    /// How a user would install the package by hand
    pub fn install_hint(&self) -> String {
        self.package_install(&self.package).command_line()
    }
}
