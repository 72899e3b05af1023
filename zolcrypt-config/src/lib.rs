//! Configuration of a zolcrypt run: the requested [`Action`] and the [`ConfigFile`] that
//! declares the LUKS devices, ZFS datasets and bind mounts making up the storage stack.
//!
//! ```
//! use zolcrypt_config::{Action, ConfigFile};
//!
//! let config = ConfigFile::try_from(
//!     r#"
//!     LUKS = ["4a1c7e55-2b7d-4f3e-9c1e-0d6d0c2f8a11"]
//!
//!     [[ZFS]]
//!     tag = "home"
//!     volume = "tank/home"
//!
//!     [[Mount]]
//!     src = "{home}"
//!     dst = "/home/{user}"
//!     mkdirs = true
//!     "#,
//! )?;
//! assert_eq!(config.zfs[0].volume.pool(), "tank");
//! assert_eq!("close".parse::<Action>()?, Action::Close);
//! # Ok::<(), anyhow::Error>(())
//! ```
#![warn(missing_docs)]

mod action;
mod file;

pub use self::{
    action::{Action, UnsupportedActionError},
    file::{ConfigFile, LuksEntry, MountEntry, Volume, ZfsEntry},
};
