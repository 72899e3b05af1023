//! The pool and dataset layer

use camino::Utf8PathBuf;
use zolcrypt_config::{Action, Volume, ZfsEntry};
use zolcrypt_host::{Command, Host, CRYPT_DIR};

use crate::{context::pool_path, Error, Layer, MountCache, Result, RunContext, Runner};

/// How the devices of a new pool are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// A single device
    Single,
    /// Two devices holding the same data
    Mirror,
    /// Three or more devices with single parity
    RaidZ,
}

impl Topology {
    /// The topology for a pool built from `count` devices, or `None` if there are none
    pub fn for_device_count(count: usize) -> Option<Self> {
        match count {
            0 => None,
            1 => Some(Topology::Single),
            2 => Some(Topology::Mirror),
            _ => Some(Topology::RaidZ),
        }
    }

    /// The vdev keyword given to `zpool create`
    pub fn keyword(&self) -> Option<&'static str> {
        match self {
            Topology::Single => None,
            Topology::Mirror => Some("mirror"),
            Topology::RaidZ => Some("raidz"),
        }
    }
}

/// The command, if any, that brings `pool` to the state of `action`
pub fn pool_plan(
    action: Action,
    pool: &str,
    present: bool,
    force: bool,
    devices: &[Utf8PathBuf],
) -> Result<Option<Command>> {
    Ok(match action {
        Action::Create if !present || force => {
            let topology = Topology::for_device_count(devices.len())
                .ok_or_else(|| Error::NoDevices { pool: pool.into() })?;
            Some(
                Command::new("zpool")
                    .args(["create", "-f", "-o", "ashift=12", pool])
                    .args(topology.keyword())
                    .args(devices.iter().map(|device| device.as_str())),
            )
        }
        Action::Open if !present => Some(
            Command::new("zpool")
                .args(["import", pool, "-d"])
                .arg(format!("{CRYPT_DIR}/")),
        ),
        Action::Close if present => Some(Command::new("zpool").args(["export", pool])),
        _ => None,
    })
}

fn dataset_exists<H: Host>(host: &H, mounts: &MountCache, volume: &Volume) -> bool {
    let path = volume.path();
    host.is_directory(&path) || mounts.is_bound(&path, &path)
}

/// Applies `action` to the pool and dataset of one entry, then binds the entry's tag
///
/// With no action, only the tag is bound. Closing uses this to make the tags available to the
/// mount layer before anything is unmounted.
pub fn apply<H: Host>(
    action: Option<Action>,
    entry: &ZfsEntry,
    ctx: &mut RunContext,
    runner: &mut Runner<H>,
) -> Result<()> {
    if let Some(action) = action {
        let pool = entry.volume.pool();
        let present = ctx.mounts.is_pool_present(pool);
        match pool_plan(action, pool, present, ctx.options().force, &ctx.devices)? {
            Some(command) => {
                runner.run(Layer::Zpool, action, command.into())?;
                match action {
                    Action::Create | Action::Open => {
                        let path = pool_path(pool);
                        ctx.mounts.bind(&path, &path);
                    }
                    Action::Close => ctx.mounts.release_pool(pool),
                }
            }
            None => tracing::debug!("Nothing to {action} for pool {pool}"),
        }

        if action == Action::Create && !dataset_exists(runner.host(), &ctx.mounts, &entry.volume) {
            let command = Command::new("zfs").args(["create", entry.volume.name()]);
            runner.run(Layer::Zfs, action, command.into())?;
            let path = entry.volume.path();
            ctx.mounts.bind(&path, &path);
        }
    }
    ctx.tags.bind(&entry.tag, entry.volume.path());
    tracing::trace!("Tags: {}", ctx.tags);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices(count: usize) -> Vec<Utf8PathBuf> {
        (1..=count)
            .map(|n| format!("/dev/zol_crypt/crypt-U{n}").into())
            .collect()
    }

    fn create_line(count: usize) -> Result<String> {
        let command = pool_plan(Action::Create, "tank", false, false, &devices(count))?;
        Ok(command.map(|c| c.to_string()).unwrap_or_default())
    }

    #[test]
    fn topology_by_count() {
        assert_eq!(Topology::for_device_count(0), None);
        assert_eq!(Topology::for_device_count(1), Some(Topology::Single));
        assert_eq!(Topology::for_device_count(2), Some(Topology::Mirror));
        assert_eq!(Topology::for_device_count(3), Some(Topology::RaidZ));
        assert_eq!(Topology::for_device_count(7), Some(Topology::RaidZ));
    }

    #[test]
    fn create_commands() -> Result<()> {
        assert_eq!(
            create_line(1)?,
            "zpool create -f -o ashift=12 tank /dev/zol_crypt/crypt-U1"
        );
        assert_eq!(
            create_line(2)?,
            "zpool create -f -o ashift=12 tank mirror /dev/zol_crypt/crypt-U1 /dev/zol_crypt/crypt-U2"
        );
        assert_eq!(
            create_line(3)?,
            "zpool create -f -o ashift=12 tank raidz \
             /dev/zol_crypt/crypt-U1 /dev/zol_crypt/crypt-U2 /dev/zol_crypt/crypt-U3"
        );
        Ok(())
    }

    #[test]
    fn create_without_devices() {
        assert!(matches!(
            pool_plan(Action::Create, "tank", false, false, &[]),
            Err(Error::NoDevices { pool }) if pool == "tank"
        ));
    }

    #[test]
    fn presence_decides() -> Result<()> {
        let devices = devices(1);
        assert_eq!(pool_plan(Action::Create, "tank", true, false, &devices)?, None);
        assert!(pool_plan(Action::Create, "tank", true, true, &devices)?.is_some());
        assert_eq!(
            pool_plan(Action::Open, "tank", false, false, &devices)?.map(|c| c.to_string()),
            Some("zpool import tank -d /dev/zol_crypt/".into())
        );
        assert_eq!(pool_plan(Action::Open, "tank", true, true, &devices)?, None);
        assert_eq!(
            pool_plan(Action::Close, "tank", true, false, &devices)?.map(|c| c.to_string()),
            Some("zpool export tank".into())
        );
        assert_eq!(pool_plan(Action::Close, "tank", false, false, &devices)?, None);
        Ok(())
    }

    #[test]
    fn no_devices_only_matters_when_creating() -> Result<()> {
        assert_eq!(pool_plan(Action::Create, "tank", true, false, &[])?, None);
        assert!(pool_plan(Action::Open, "tank", false, false, &[])?.is_some());
        Ok(())
    }
}
