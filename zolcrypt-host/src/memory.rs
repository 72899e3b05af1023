use std::{
    collections::{BTreeMap, BTreeSet},
    io,
};

use camino::{Utf8Path, Utf8PathBuf};

use super::{
    ActiveMount, Command, Host, HostError, Operation, Result, MAPPER_DIR, PRINCIPAL_ROOT,
    ROOT_PRINCIPAL, UUID_DIR,
};

const MAX_LINK_DEPTH: usize = 8;

/// An in-memory model of a machine's devices, directories, pools and mounts
///
/// The tool commands issued by the reconciler are interpreted against the model, and commands
/// that would fail on a real machine (opening a mapper twice, exporting a pool that is still
/// bind-mounted, closing a device in use by a pool) are refused with a
/// [`HostError::CommandExecution`].
#[derive(Debug)]
pub struct MemoryHost {
    nodes: BTreeMap<Utf8PathBuf, Node>,
    accounts: BTreeSet<String>,
    formatted: BTreeSet<Utf8PathBuf>,
    pools: BTreeMap<String, Pool>,
    /// Mount target to mounted source
    mounts: BTreeMap<Utf8PathBuf, Utf8PathBuf>,
    failures: Vec<String>,
    history: Vec<Operation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Directory { owner: String },
    Device,
    Symlink { target: Utf8PathBuf },
}

/// A pool known to the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    /// The redundancy keyword given at creation (`mirror`, `raidz`), if any
    pub topology: Option<String>,
    /// The device paths the pool was built from
    pub devices: Vec<Utf8PathBuf>,
    /// Names of the datasets created within the pool (excluding the pool itself)
    pub datasets: BTreeSet<String>,
    /// Whether the pool is currently imported
    pub imported: bool,
}

impl MemoryHost {
    /// Creates a machine with the standard device directories, an empty [`PRINCIPAL_ROOT`]
    /// and a `root` account
    pub fn new() -> Self {
        let mut host = MemoryHost {
            nodes: BTreeMap::new(),
            accounts: BTreeSet::new(),
            formatted: BTreeSet::new(),
            pools: BTreeMap::new(),
            mounts: BTreeMap::new(),
            failures: Vec::new(),
            history: Vec::new(),
        };
        host.accounts.insert(ROOT_PRINCIPAL.into());
        for dir in [
            "/",
            "/dev",
            MAPPER_DIR,
            "/dev/disk",
            UUID_DIR,
            PRINCIPAL_ROOT,
        ] {
            host.nodes.insert(dir.into(), directory(ROOT_PRINCIPAL));
        }
        host
    }

    /// Adds an unformatted raw block device with the given UUID
    pub fn with_device(mut self, uuid: &str) -> Self {
        self.nodes
            .insert(Utf8Path::new(UUID_DIR).join(uuid), Node::Device);
        self
    }

    /// Adds an account with a home directory under [`PRINCIPAL_ROOT`] that it owns
    pub fn with_principal(mut self, name: &str) -> Self {
        self.accounts.insert(name.into());
        self.nodes
            .insert(Utf8Path::new(PRINCIPAL_ROOT).join(name), directory(name));
        self
    }

    /// Adds an account without a home directory
    pub fn with_account(mut self, name: &str) -> Self {
        self.accounts.insert(name.into());
        self
    }

    /// Adds a directory (and any missing parents) owned by the given account
    pub fn with_directory(mut self, path: &str, owner: &str) -> Self {
        for ancestor in Utf8Path::new(path).ancestors().skip(1) {
            self.nodes
                .entry(ancestor.to_owned())
                .or_insert_with(|| directory(ROOT_PRINCIPAL));
        }
        self.nodes.insert(path.into(), directory(owner));
        self
    }

    /// Removes [`PRINCIPAL_ROOT`] and everything beneath it
    pub fn without_principal_root(mut self) -> Self {
        self.nodes.retain(|path, _| !path.starts_with(PRINCIPAL_ROOT));
        self
    }

    /// Makes every command whose command line starts with `prefix` fail
    pub fn failing_on(mut self, prefix: &str) -> Self {
        self.failures.push(prefix.into());
        self
    }

    /// Stops failing commands
    pub fn clear_failures(&mut self) {
        self.failures.clear();
    }

    /// Every operation handed to [`Host::execute`], in order, including any that failed
    pub fn history(&self) -> &[Operation] {
        &self.history
    }

    /// Forgets the recorded history
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// The pool of the given name, if it was ever created
    pub fn pool(&self, name: &str) -> Option<&Pool> {
        self.pools.get(name)
    }

    /// The source mounted at the given target, if any
    pub fn mounted_at(&self, target: impl AsRef<Utf8Path>) -> Option<&Utf8Path> {
        self.mounts.get(target.as_ref()).map(Utf8PathBuf::as_path)
    }

    /// Where `path` really lives once bind mounts covering it are taken into account
    fn through_mounts(&self, path: &Utf8Path) -> Utf8PathBuf {
        for ancestor in path.ancestors() {
            match self.mounts.get(ancestor) {
                Some(source) if source != ancestor => {
                    let rest = path.strip_prefix(ancestor).unwrap_or(path);
                    return if rest.as_str().is_empty() {
                        source.clone()
                    } else {
                        source.join(rest)
                    };
                }
                _ => {}
            }
        }
        path.to_owned()
    }

    /// Follows bind mounts and symlinks from `path` to the node they lead to
    fn resolve(&self, path: &Utf8Path) -> Option<(Utf8PathBuf, &Node)> {
        let mut path = self.through_mounts(path);
        for _ in 0..MAX_LINK_DEPTH {
            match self.nodes.get(&path)? {
                Node::Symlink { target } => path = target.clone(),
                node => return Some((path, node)),
            }
        }
        None
    }

    fn interpret(&mut self, command: &Command) -> std::result::Result<(), String> {
        let line = command.to_string();
        if self.failures.iter().any(|prefix| line.starts_with(prefix)) {
            return Err("injected failure".into());
        }
        let args: Vec<&str> = command.arguments().iter().map(String::as_str).collect();
        match (command.program(), args.as_slice()) {
            ("cryptsetup", ["luksFormat", device, uuid]) => {
                if !uuid.starts_with("--uuid=") {
                    return Err(format!("unexpected argument {uuid}"));
                }
                self.luks_format(Utf8Path::new(device))
            }
            ("cryptsetup", ["luksOpen", device, name]) => {
                self.luks_open(Utf8Path::new(device), name)
            }
            ("cryptsetup", ["luksClose", name]) => self.luks_close(name),
            ("ln", ["-s", target, link]) => self.symlink(target, Utf8Path::new(link)),
            ("rm", [path]) => self.remove(Utf8Path::new(path)),
            ("zpool", ["create", "-f", "-o", "ashift=12", pool, rest @ ..]) => {
                self.zpool_create(pool, rest)
            }
            ("zpool", ["import", pool, "-d", _]) => self.zpool_import(pool),
            ("zpool", ["export", pool]) => self.zpool_export(pool),
            ("zfs", ["create", volume]) => self.zfs_create(volume),
            ("mount", ["-o", "bind", source, target]) => {
                self.bind(Utf8Path::new(source), Utf8Path::new(target))
            }
            ("umount", [target]) => match self.mounts.remove(Utf8Path::new(target)) {
                Some(_) => Ok(()),
                None => Err(format!("{target}: not mounted")),
            },
            _ => Err("unknown command".into()),
        }
    }

    fn luks_format(&mut self, device: &Utf8Path) -> std::result::Result<(), String> {
        match self.nodes.get(device) {
            Some(Node::Device) => {
                self.formatted.insert(device.to_owned());
                Ok(())
            }
            _ => Err(format!("device {device} does not exist")),
        }
    }

    fn luks_open(&mut self, device: &Utf8Path, name: &str) -> std::result::Result<(), String> {
        if !self.formatted.contains(device) {
            return Err(format!("device {device} is not a valid LUKS device"));
        }
        let mapper = Utf8Path::new(MAPPER_DIR).join(name);
        if self.nodes.contains_key(&mapper) {
            return Err(format!("device {name} already exists"));
        }
        self.nodes.insert(mapper, Node::Device);
        Ok(())
    }

    fn luks_close(&mut self, name: &str) -> std::result::Result<(), String> {
        let mapper = Utf8Path::new(MAPPER_DIR).join(name);
        if !self.nodes.contains_key(&mapper) {
            return Err(format!("device {name} is not active"));
        }
        let in_use = self
            .pools
            .values()
            .filter(|pool| pool.imported)
            .flat_map(|pool| pool.devices.iter())
            .any(|device| self.resolve(device).map(|(path, _)| path) == Some(mapper.clone()));
        if in_use {
            return Err(format!("device {name} is still in use"));
        }
        self.nodes.remove(&mapper);
        Ok(())
    }

    fn symlink(&mut self, target: &str, link: &Utf8Path) -> std::result::Result<(), String> {
        let parent = link.parent().ok_or("cannot link at /")?;
        if !matches!(self.nodes.get(parent), Some(Node::Directory { .. })) {
            return Err(format!("{parent}: no such directory"));
        }
        if self.nodes.contains_key(link) {
            return Err(format!("{link}: file exists"));
        }
        self.nodes.insert(
            link.to_owned(),
            Node::Symlink {
                target: target.into(),
            },
        );
        Ok(())
    }

    fn remove(&mut self, path: &Utf8Path) -> std::result::Result<(), String> {
        match self.nodes.get(path) {
            None => Err(format!("{path}: no such file or directory")),
            Some(Node::Directory { .. }) => Err(format!("{path}: is a directory")),
            Some(_) => {
                self.nodes.remove(path);
                Ok(())
            }
        }
    }

    fn zpool_create(&mut self, name: &str, rest: &[&str]) -> std::result::Result<(), String> {
        if self.pools.get(name).map_or(false, |pool| pool.imported) {
            return Err(format!("pool {name} already exists"));
        }
        let (topology, devices) = match rest {
            [keyword @ ("mirror" | "raidz"), devices @ ..] => (Some(keyword.to_string()), devices),
            devices => (None, devices),
        };
        if devices.is_empty() {
            return Err("missing vdev specification".into());
        }
        let devices: Vec<Utf8PathBuf> = devices.iter().copied().map(Utf8PathBuf::from).collect();
        if let Some(missing) = devices.iter().find(|device| !self.exists(device)) {
            return Err(format!("cannot open {missing}: no such device"));
        }
        self.pools.insert(
            name.into(),
            Pool {
                topology,
                devices,
                datasets: BTreeSet::new(),
                imported: true,
            },
        );
        self.mount_dataset(name);
        Ok(())
    }

    fn zpool_import(&mut self, name: &str) -> std::result::Result<(), String> {
        let pool = self
            .pools
            .get(name)
            .ok_or_else(|| format!("cannot import {name}: no such pool available"))?;
        if pool.imported {
            return Err(format!("cannot import {name}: pool already imported"));
        }
        if let Some(missing) = pool.devices.iter().find(|device| !self.exists(device)) {
            return Err(format!("cannot import {name}: device {missing} unavailable"));
        }
        let datasets: Vec<String> = pool.datasets.iter().cloned().collect();
        if let Some(pool) = self.pools.get_mut(name) {
            pool.imported = true;
        }
        self.mount_dataset(name);
        for dataset in datasets {
            self.mount_dataset(&dataset);
        }
        Ok(())
    }

    fn zpool_export(&mut self, name: &str) -> std::result::Result<(), String> {
        if !self.pools.get(name).map_or(false, |pool| pool.imported) {
            return Err(format!("cannot open {name}: no such pool"));
        }
        let root = Utf8Path::new("/").join(name);
        let busy = self
            .mounts
            .iter()
            .any(|(target, source)| source.starts_with(&root) && target != source);
        if busy {
            return Err(format!("cannot export {name}: pool is busy"));
        }
        self.mounts
            .retain(|target, source| !(source.starts_with(&root) && target == source));
        if let Some(pool) = self.pools.get_mut(name) {
            pool.imported = false;
        }
        Ok(())
    }

    fn zfs_create(&mut self, volume: &str) -> std::result::Result<(), String> {
        let (parent, _) = volume
            .rsplit_once('/')
            .ok_or_else(|| format!("cannot create {volume}: missing dataset name"))?;
        let pool_name = parent.split('/').next().unwrap_or(parent);
        let pool = self
            .pools
            .get_mut(pool_name)
            .filter(|pool| pool.imported)
            .ok_or_else(|| format!("cannot create {volume}: no such pool '{pool_name}'"))?;
        if parent != pool_name && !pool.datasets.contains(parent) {
            return Err(format!("cannot create {volume}: parent does not exist"));
        }
        if !pool.datasets.insert(volume.into()) {
            return Err(format!("cannot create {volume}: dataset already exists"));
        }
        self.mount_dataset(volume);
        Ok(())
    }

    fn mount_dataset(&mut self, dataset: &str) {
        let path = Utf8Path::new("/").join(dataset);
        for ancestor in path.ancestors() {
            self.nodes
                .entry(ancestor.to_owned())
                .or_insert_with(|| directory(ROOT_PRINCIPAL));
        }
        self.mounts.insert(path.clone(), path);
    }

    fn bind(&mut self, source: &Utf8Path, target: &Utf8Path) -> std::result::Result<(), String> {
        if !self.is_directory(source) {
            return Err(format!("special device {source} does not exist"));
        }
        if !self.is_directory(target) {
            return Err(format!("mount point {target} does not exist"));
        }
        self.mounts.insert(target.to_owned(), source.to_owned());
        Ok(())
    }

    fn create_directory(&mut self, path: &Utf8Path, owner: &str) -> Result<()> {
        if !self.has_principal(owner) {
            return Err(HostError::PrincipalNotFound(owner.into()));
        }
        let path = self.through_mounts(path);
        let ancestors: Vec<&Utf8Path> = path.ancestors().skip(1).collect();
        for ancestor in ancestors.into_iter().rev() {
            match self.resolve(ancestor) {
                Some((_, Node::Directory { .. })) => {}
                Some(_) => {
                    return Err(HostError::DirectoryCreation {
                        path: path.clone(),
                        source: io::Error::new(
                            io::ErrorKind::Other,
                            format!("{ancestor} is not a directory"),
                        ),
                    })
                }
                None => {
                    self.nodes.insert(ancestor.into(), directory(ROOT_PRINCIPAL));
                }
            }
        }
        match self.nodes.get_mut(&path) {
            Some(Node::Directory { owner: current }) => *current = owner.into(),
            Some(_) => {}
            None => {
                self.nodes.insert(path, directory(owner));
            }
        }
        Ok(())
    }

    fn set_owner(&mut self, path: &Utf8Path, owner: &str) -> Result<()> {
        if !self.has_principal(owner) {
            return Err(HostError::PrincipalNotFound(owner.into()));
        }
        let seen = self.through_mounts(path);
        match self.nodes.get_mut(&seen) {
            Some(Node::Directory { owner: current }) => {
                *current = owner.into();
                Ok(())
            }
            _ => Err(HostError::Ownership {
                path: path.to_owned(),
                owner: owner.into(),
                source: nix::errno::Errno::ENOENT,
            }),
        }
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

fn directory(owner: &str) -> Node {
    Node::Directory {
        owner: owner.into(),
    }
}

impl Host for MemoryHost {
    fn pool_mounts(&self) -> Result<Vec<ActiveMount>> {
        Ok(self
            .mounts
            .iter()
            .map(|(target, source)| ActiveMount {
                source: source.clone(),
                target: target.clone(),
            })
            .collect())
    }

    fn principals(&self) -> Result<Vec<String>> {
        let root = Utf8Path::new(PRINCIPAL_ROOT);
        if !matches!(self.nodes.get(root), Some(Node::Directory { .. })) {
            return Err(HostError::EnvironmentProbe {
                path: root.to_owned(),
                source: io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
            });
        }
        Ok(self
            .nodes
            .keys()
            .filter(|path| path.parent() == Some(root))
            .filter_map(|path| path.file_name().map(str::to_owned))
            .collect())
    }

    fn has_principal(&self, name: &str) -> bool {
        self.accounts.contains(name)
    }

    fn exists(&self, path: impl AsRef<Utf8Path>) -> bool {
        self.resolve(path.as_ref()).is_some()
    }

    fn is_directory(&self, path: impl AsRef<Utf8Path>) -> bool {
        matches!(
            self.resolve(path.as_ref()),
            Some((_, Node::Directory { .. }))
        )
    }

    fn owner(&self, path: impl AsRef<Utf8Path>) -> Option<String> {
        match self.resolve(path.as_ref())? {
            (_, Node::Directory { owner }) => Some(owner.clone()),
            _ => Some(ROOT_PRINCIPAL.into()),
        }
    }

    fn execute(&mut self, operation: &Operation) -> Result<()> {
        self.history.push(operation.clone());
        match operation {
            Operation::Run(command) => self.interpret(command).map_err(|reason| {
                tracing::debug!("Refusing `{command}`: {reason}");
                HostError::CommandExecution {
                    command: command.to_string(),
                    code: Some(1),
                }
            }),
            Operation::CreateDirectory { path, owner } => self.create_directory(path, owner),
            Operation::SetOwner { path, owner } => self.set_owner(path, owner),
        }
    }
}
