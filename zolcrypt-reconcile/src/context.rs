use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
};

use camino::{Utf8Path, Utf8PathBuf};
use zolcrypt_host::ActiveMount;

use crate::SystemState;

/// Switches fixed for the duration of a run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Reformat devices and rebuild pools on `create` even if they exist
    pub force: bool,
    /// Log operations without executing them
    pub simulate: bool,
}

/// The state of one reconciliation run, passed to every layer driver
///
/// Built from a [`SystemState`] probe and then updated by the drivers as they issue
/// operations, so later entries and layers see the effects of earlier ones (including
/// hypothetical effects when simulating).
#[derive(Debug)]
pub struct RunContext {
    options: RunOptions,
    principals: Vec<String>,
    pub(crate) mounts: MountCache,
    pub(crate) devices: Vec<Utf8PathBuf>,
    pub(crate) tags: TagBindings,
    ensured: BTreeSet<Utf8PathBuf>,
}

impl RunContext {
    /// Starts a run from probed state
    pub fn new(state: SystemState, options: RunOptions) -> Self {
        let SystemState { mounts, principals } = state;
        RunContext {
            options,
            principals,
            mounts,
            devices: Vec::new(),
            tags: TagBindings::default(),
            ensured: BTreeSet::new(),
        }
    }

    /// The options of this run
    pub fn options(&self) -> RunOptions {
        self.options
    }

    /// The principals found when the run started
    pub fn principals(&self) -> &[String] {
        &self.principals
    }

    /// The current view of active mounts
    pub fn mounts(&self) -> &MountCache {
        &self.mounts
    }

    /// Device paths of every LUKS entry processed so far, in order
    pub fn devices(&self) -> &[Utf8PathBuf] {
        &self.devices
    }

    /// Tag bindings established so far
    pub fn tags(&self) -> &TagBindings {
        &self.tags
    }

    pub(crate) fn mark_ensured(&mut self, path: &Utf8Path) {
        self.ensured.insert(path.to_owned());
    }

    pub(crate) fn was_ensured(&self, path: &Utf8Path) -> bool {
        self.ensured.contains(path)
    }
}

/// Active mounts of the pool filesystem, by mount point
///
/// Pools and datasets appear mapped onto themselves (`/tank` → `/tank`), bind mounts map their
/// mount point to the path they expose.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MountCache(BTreeMap<Utf8PathBuf, Utf8PathBuf>);

impl MountCache {
    /// Returns true if `source` is what is mounted at `target`
    pub fn is_bound(&self, source: impl AsRef<Utf8Path>, target: impl AsRef<Utf8Path>) -> bool {
        self.0
            .get(target.as_ref())
            .map_or(false, |current| current == source.as_ref())
    }

    /// The source mounted at `target`, if any
    pub fn source_of(&self, target: impl AsRef<Utf8Path>) -> Option<&Utf8Path> {
        self.0.get(target.as_ref()).map(Utf8PathBuf::as_path)
    }

    /// Records `source` as mounted at `target`
    pub fn bind(&mut self, source: impl AsRef<Utf8Path>, target: impl AsRef<Utf8Path>) {
        self.0
            .insert(target.as_ref().to_owned(), source.as_ref().to_owned());
    }

    /// Records that nothing is mounted at `target`
    pub fn unbind(&mut self, target: impl AsRef<Utf8Path>) {
        self.0.remove(target.as_ref());
    }

    /// A pool is present when its mount path is mapped onto itself
    pub fn is_pool_present(&self, pool: &str) -> bool {
        let path = pool_path(pool);
        self.is_bound(&path, &path)
    }

    /// Records that a pool and its datasets are no longer mounted
    pub fn release_pool(&mut self, pool: &str) {
        let root = pool_path(pool);
        self.0
            .retain(|target, source| !(source == target && source.starts_with(&root)));
    }

    /// Number of recorded mounts
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no mounts are recorded
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<ActiveMount> for MountCache {
    fn from_iter<T: IntoIterator<Item = ActiveMount>>(iter: T) -> Self {
        MountCache(
            iter.into_iter()
                .map(|ActiveMount { source, target }| (target, source))
                .collect(),
        )
    }
}

/// The mount path of a pool
pub(crate) fn pool_path(pool: &str) -> Utf8PathBuf {
    Utf8Path::new("/").join(pool)
}

/// Tag name to the path of the dataset that declared it
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TagBindings(BTreeMap<String, Utf8PathBuf>);

impl TagBindings {
    /// Binds (or rebinds) a tag to a path
    pub fn bind(&mut self, tag: impl Into<String>, path: impl Into<Utf8PathBuf>) {
        self.0.insert(tag.into(), path.into());
    }

    /// The path bound to a tag
    pub fn get(&self, tag: &str) -> Option<&Utf8Path> {
        self.0.get(tag).map(Utf8PathBuf::as_path)
    }

    /// Number of bound tags
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no tags are bound
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for TagBindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (index, (tag, path)) in self.0.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{tag}: {path}")?;
        }
        write!(f, "}}")
    }
}
