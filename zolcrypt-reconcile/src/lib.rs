//! The ordering and idempotency engine that brings a LUKS → ZFS → bind mount storage stack to
//! the state requested by an [`Action`].
//!
//! A run [probes](SystemState::probe) the host once, then walks the configuration one layer at a
//! time in the order given by [`phases`]. Each layer driver compares an entry against the probed
//! state and hands only the operations that are still needed to the [`Runner`]. What the drivers
//! learn along the way (opened devices, tag bindings, mounts made) is carried in a [`RunContext`]
//! that lives exactly as long as the run.
//!
//! ```
//! use zolcrypt_config::{Action, ConfigFile};
//! use zolcrypt_host::MemoryHost;
//! use zolcrypt_reconcile::{reconcile, RunOptions};
//!
//! let config = ConfigFile::try_from(
//!     r#"
//!     LUKS = ["U1"]
//!     ZFS = [{ tag = "home", volume = "tank/home" }]
//!     Mount = [{ src = "{home}", dst = "/home/{user}", mkdirs = true }]
//!     "#,
//! )?;
//! let mut host = MemoryHost::new().with_device("U1").with_principal("alice");
//!
//! let report = reconcile(Action::Create, &config, RunOptions::default(), &mut host)?;
//! assert_eq!(report.len(), 7);
//!
//! // Everything is in place, so opening changes nothing
//! let report = reconcile(Action::Open, &config, RunOptions::default(), &mut host)?;
//! assert!(report.is_empty());
//! # Ok::<(), anyhow::Error>(())
//! ```

mod context;
mod directory;
mod error;
mod order;
mod probe;
mod runner;
mod template;

pub mod luks;
pub mod mount;
pub mod zfs;

pub use zolcrypt_config::Action;

pub use self::{
    context::{MountCache, RunContext, RunOptions, TagBindings},
    error::{Error, Result},
    order::{phases, reconcile, reconcile_named, validate, Phase},
    probe::SystemState,
    runner::{Issued, Layer, Report, Runner},
    template::{Template, Token, USER_PLACEHOLDER},
};

#[cfg(test)]
mod tests;
