use std::fmt::Display;

use camino::Utf8PathBuf;

/// A change to be made to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Run an external program
    Run(Command),
    /// Create a directory (and any missing parents), owned by the given principal
    CreateDirectory {
        /// The directory to create
        path: Utf8PathBuf,
        /// The principal to own it
        owner: String,
    },
    /// Give an existing path to the given principal
    SetOwner {
        /// The path to change
        path: Utf8PathBuf,
        /// The principal to own it
        owner: String,
    },
}

impl Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Run(command) => write!(f, "{command}"),
            Operation::CreateDirectory { path, owner } => write!(f, "mkdir -p {path} [{owner}]"),
            Operation::SetOwner { path, owner } => write!(f, "chown {owner} {path}"),
        }
    }
}

impl From<Command> for Operation {
    fn from(command: Command) -> Self {
        Operation::Run(command)
    }
}

/// An external program with its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    program: String,
    args: Vec<String>,
}

impl Command {
    /// Starts a command line for the given program
    pub fn new(program: impl Into<String>) -> Self {
        Command {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends a single argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends each of the given arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The program to run
    pub fn program(&self) -> &str {
        &self.program
    }

    /// The arguments to pass
    pub fn arguments(&self) -> &[String] {
        &self.args
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}
