//! Provides an abstract [`Host`] trait, together with a real ([`SystemHost`]) and an in-memory
//! ([`MemoryHost`]) implementation.
//!
//! A host answers questions about the current state of the machine (which mounts are active,
//! which device nodes exist, who owns a directory) and carries out [`Operation`]s. Everything
//! that changes the machine goes through [`Host::execute`].
#![warn(missing_docs)]

use camino::{Utf8Path, Utf8PathBuf};

mod error;
mod memory;
mod operation;
mod system;

pub use self::{
    error::{HostError, Result},
    memory::{MemoryHost, Pool},
    operation::{Command, Operation},
    system::SystemHost,
};

/// Directory holding the decrypted mapper devices
pub const MAPPER_DIR: &str = "/dev/mapper";
/// Directory holding raw block devices by UUID
pub const UUID_DIR: &str = "/dev/disk/by-uuid";
/// Directory of symlinks to opened mapper devices, from which pools are imported
pub const CRYPT_DIR: &str = "/dev/zol_crypt";
/// Directory whose entries are the principals (users) of the system
pub const PRINCIPAL_ROOT: &str = "/home";
/// The filesystem type whose mounts are probed
pub const POOL_FSTYPE: &str = "zfs";
/// The principal used when a template does not mention `{user}`
pub const ROOT_PRINCIPAL: &str = "root";

/// An active mount, where `source` is visible at `target`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveMount {
    /// The path (within the pool filesystem) being made visible
    pub source: Utf8PathBuf,
    /// The mount point
    pub target: Utf8PathBuf,
}

/// Access to the state of a machine and the means to change it
pub trait Host {
    /// Returns all active mounts of the [`POOL_FSTYPE`] filesystem type
    ///
    /// Having no such mounts is not an error.
    fn pool_mounts(&self) -> Result<Vec<ActiveMount>>;

    /// Returns the principals found under [`PRINCIPAL_ROOT`], sorted by name
    fn principals(&self) -> Result<Vec<String>>;

    /// Returns true if an account with the given name exists
    fn has_principal(&self, name: &str) -> bool;

    /// Returns true if the path exists (following symlinks)
    fn exists(&self, path: impl AsRef<Utf8Path>) -> bool;

    /// Returns true if the path is a directory (following symlinks)
    fn is_directory(&self, path: impl AsRef<Utf8Path>) -> bool;

    /// Returns the name of the account owning the path, if it exists
    fn owner(&self, path: impl AsRef<Utf8Path>) -> Option<String>;

    /// Carries out the operation, failing if it could not be completed
    fn execute(&mut self, operation: &Operation) -> Result<()>;
}
