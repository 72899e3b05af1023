use std::io;

use camino::Utf8PathBuf;
use thiserror::Error;

/// Failures reported by a [`Host`](crate::Host)
#[derive(Debug, Error)]
pub enum HostError {
    /// The principals of the system could not be enumerated
    #[error("Cannot enumerate principals under {path}")]
    EnvironmentProbe {
        /// The directory that was listed
        path: Utf8PathBuf,
        /// The underlying cause
        #[source]
        source: io::Error,
    },

    /// The mount listing tool could not be started
    #[error("Cannot query active mounts with `{command}`")]
    MountProbe {
        /// The command line that was attempted
        command: String,
        /// The underlying cause
        #[source]
        source: io::Error,
    },

    /// A directory could not be created, for a reason other than it already existing
    #[error("Cannot create directory {path}")]
    DirectoryCreation {
        /// The directory being created
        path: Utf8PathBuf,
        /// The underlying cause
        #[source]
        source: io::Error,
    },

    /// Ownership was to be given to an account that does not exist
    #[error("No such principal: {0}")]
    PrincipalNotFound(String),

    /// Ownership of an existing path could not be changed
    #[error("Cannot change owner of {path} to {owner}")]
    Ownership {
        /// The path whose owner was being set
        path: Utf8PathBuf,
        /// The intended owner
        owner: String,
        /// The underlying cause
        #[source]
        source: nix::Error,
    },

    /// An external command could not be started
    #[error("Cannot start `{command}`")]
    CommandSpawn {
        /// The command line that was attempted
        command: String,
        /// The underlying cause
        #[source]
        source: io::Error,
    },

    /// An external command ran but did not succeed
    #[error("Command `{command}` failed ({})", describe_exit(.code))]
    CommandExecution {
        /// The command line that failed
        command: String,
        /// The exit code, or `None` if terminated by a signal
        code: Option<i32>,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_owned(),
    }
}

/// Result type for host operations
pub type Result<T, E = HostError> = std::result::Result<T, E>;
