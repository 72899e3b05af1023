use thiserror::Error;
use zolcrypt_config::UnsupportedActionError;
use zolcrypt_host::HostError;

/// Reasons a reconciliation run stops
///
/// Every error is fatal to the run. Nothing already applied is rolled back; running the same
/// action again skips the steps that completed.
#[derive(Debug, Error)]
pub enum Error {
    /// Probing, a directory or ownership change, or an external command failed
    #[error(transparent)]
    Host(#[from] HostError),

    /// The requested action is not one of `create`, `open` or `close`
    #[error(transparent)]
    UnsupportedAction(#[from] UnsupportedActionError),

    /// A mount template names a placeholder with no value
    #[error("Cannot resolve {{{placeholder}}} in path template \"{template}\"")]
    PathResolution {
        /// The name between the braces
        placeholder: String,
        /// The template as written in the configuration
        template: String,
    },

    /// A mount template could not be parsed
    #[error("Invalid path template \"{template}\": {reason}")]
    InvalidTemplate {
        /// The template as written in the configuration
        template: String,
        /// What is wrong with it
        reason: String,
    },

    /// A pool was to be created before any LUKS device was processed
    #[error("Cannot create pool \"{pool}\" without any LUKS devices")]
    NoDevices {
        /// The pool to be created
        pool: String,
    },

    /// More than one pool would be created, each from every configured device
    #[error(
        "Cannot create pools {} in one run: each would be built from all {devices} LUKS devices",
        .pools.join(", ")
    )]
    AmbiguousTopology {
        /// The pools named by the ZFS section
        pools: Vec<String>,
        /// The number of LUKS devices configured
        devices: usize,
    },
}

/// Result type for reconciliation
pub type Result<T, E = Error> = std::result::Result<T, E>;
