use std::fmt::Display;

use anyhow::{bail, Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

/// Deserialization of a zolcrypt configuration file
///
/// Each section is processed in file order. A missing section is the same as an empty one.
#[derive(Deserialize, Default, Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    /// Encrypted block devices, by UUID
    #[serde(rename = "LUKS", default)]
    pub luks: Vec<LuksEntry>,

    /// Datasets to create or import, each binding a tag to the dataset's path
    #[serde(rename = "ZFS", default)]
    pub zfs: Vec<ZfsEntry>,

    /// Bind mounts, with source and destination given as path templates
    #[serde(rename = "Mount", default)]
    pub mount: Vec<MountEntry>,
}

/// A LUKS formatted block device
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct LuksEntry {
    /// The UUID of the raw device, as found under `/dev/disk/by-uuid/`
    pub uuid: String,
}

/// A dataset within a pool, and the tag under which its path is made available to mounts
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ZfsEntry {
    /// Name by which mount templates refer to this dataset's path
    pub tag: String,
    /// The dataset, in `<pool>/<dataset>` form
    pub volume: Volume,
}

/// A bind mount of `src` onto `dst`
///
/// Both are templates that may contain `{user}` and `{<tag>}` placeholders. Any `action` key
/// present in the file is accepted and ignored.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Template of the path to be made visible
    pub src: String,
    /// Template of the path at which to make it visible
    pub dst: String,
    /// Whether to create the destination (owned by the principal) before mounting
    #[serde(default)]
    pub mkdirs: bool,
}

/// A ZFS dataset name such as `tank/home/media`, whose first component names the pool
#[derive(Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(try_from = "String")]
pub struct Volume(String);

impl Volume {
    /// The full dataset name
    pub fn name(&self) -> &str {
        &self.0
    }

    /// The name of the pool holding this dataset
    pub fn pool(&self) -> &str {
        self.0.split('/').next().unwrap_or(&self.0)
    }

    /// The path at which the dataset is mounted
    pub fn path(&self) -> Utf8PathBuf {
        Utf8Path::new("/").join(&self.0)
    }
}

impl TryFrom<String> for Volume {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        if value.starts_with('/') {
            bail!("Volume \"{value}\" must be a dataset name, not a path");
        }
        if value.split('/').any(str::is_empty) {
            bail!("Volume \"{value}\" must be of the form <pool>/<dataset>");
        }
        Ok(Volume(value))
    }
}

impl TryFrom<&str> for Volume {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self> {
        value.to_owned().try_into()
    }
}

impl Display for Volume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl ConfigFile {
    /// Load a configuration from the specified file
    ///
    pub fn load(path: impl AsRef<Utf8Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_context = || format!("Reading config file {path:?}");
        let config_data = std::fs::read_to_string(path).with_context(config_context)?;
        let config: ConfigFile = config_data
            .as_str()
            .try_into()
            .with_context(|| format!("Parsing config file {path:?}"))?;
        tracing::debug!(
            "Loaded {}: {} LUKS, {} ZFS, {} Mount entries",
            path,
            config.luks.len(),
            config.zfs.len(),
            config.mount.len()
        );
        Ok(config)
    }

    /// The distinct pools referenced by the ZFS section, in order of first appearance
    pub fn pools(&self) -> Vec<&str> {
        let mut pools: Vec<&str> = Vec::new();
        for entry in &self.zfs {
            let pool = entry.volume.pool();
            if !pools.contains(&pool) {
                pools.push(pool);
            }
        }
        pools
    }
}

impl TryFrom<&str> for ConfigFile {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Ok(toml::from_str(value)?)
    }
}
