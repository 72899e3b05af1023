use std::{fs, io, os::unix::fs::MetadataExt, process, sync::OnceLock};

use camino::{Utf8Path, Utf8PathBuf};
use nix::unistd::{Gid, Uid};
use regex::Regex;
use users::{Users, UsersCache};

use super::{ActiveMount, Command, Host, HostError, Operation, Result, POOL_FSTYPE, PRINCIPAL_ROOT};

/// Access to the real machine
///
/// Commands inherit the terminal, so tools such as `cryptsetup` may prompt for passphrases.
pub struct SystemHost {
    users: UsersCache,
}

impl SystemHost {
    /// Creates access to the machine, with an empty account cache
    pub fn new() -> Self {
        SystemHost {
            users: UsersCache::new(),
        }
    }

    fn run(&self, command: &Command) -> Result<()> {
        let status = process::Command::new(command.program())
            .args(command.arguments())
            .status()
            .map_err(|source| HostError::CommandSpawn {
                command: command.to_string(),
                source,
            })?;
        if !status.success() {
            return Err(HostError::CommandExecution {
                command: command.to_string(),
                code: status.code(),
            });
        }
        Ok(())
    }

    fn create_directory(&self, path: &Utf8Path, owner: &str) -> Result<()> {
        match fs::create_dir_all(path) {
            Err(err) if err.kind() != io::ErrorKind::AlreadyExists => {
                return Err(HostError::DirectoryCreation {
                    path: path.to_owned(),
                    source: err,
                })
            }
            _ => {}
        }
        self.set_owner(path, owner)
    }

    fn set_owner(&self, path: &Utf8Path, owner: &str) -> Result<()> {
        let user = self
            .users
            .get_user_by_name(owner)
            .ok_or_else(|| HostError::PrincipalNotFound(owner.to_owned()))?;
        let uid = Uid::from_raw(user.uid());
        let gid = Gid::from_raw(user.primary_group_id());
        nix::unistd::chown(path.as_std_path(), Some(uid), Some(gid)).map_err(|source| {
            HostError::Ownership {
                path: path.to_owned(),
                owner: owner.to_owned(),
                source,
            }
        })
    }
}

impl Default for SystemHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for SystemHost {
    fn pool_mounts(&self) -> Result<Vec<ActiveMount>> {
        let command = Command::new("findmnt")
            .args(["-t", POOL_FSTYPE, "-n", "-r"])
            .args(["-o", "SOURCE,TARGET"]);
        let output = process::Command::new(command.program())
            .args(command.arguments())
            .output()
            .map_err(|source| HostError::MountProbe {
                command: command.to_string(),
                source,
            })?;
        // findmnt exits non-zero when nothing matches
        if !output.status.success() {
            tracing::debug!("No {} mounts found system-wide", POOL_FSTYPE);
            return Ok(Vec::new());
        }
        Ok(parse_findmnt(&String::from_utf8_lossy(&output.stdout)))
    }

    fn principals(&self) -> Result<Vec<String>> {
        let probe_error = |source| HostError::EnvironmentProbe {
            path: PRINCIPAL_ROOT.into(),
            source,
        };
        let mut principals = Vec::new();
        for entry in fs::read_dir(PRINCIPAL_ROOT).map_err(probe_error)? {
            let entry = entry.map_err(probe_error)?;
            principals.push(entry.file_name().to_string_lossy().into_owned());
        }
        principals.sort();
        Ok(principals)
    }

    fn has_principal(&self, name: &str) -> bool {
        self.users.get_user_by_name(name).is_some()
    }

    fn exists(&self, path: impl AsRef<Utf8Path>) -> bool {
        fs::metadata(path.as_ref()).is_ok()
    }

    fn is_directory(&self, path: impl AsRef<Utf8Path>) -> bool {
        fs::metadata(path.as_ref())
            .map(|m| m.file_type().is_dir())
            .unwrap_or(false)
    }

    fn owner(&self, path: impl AsRef<Utf8Path>) -> Option<String> {
        let uid = fs::metadata(path.as_ref()).ok()?.uid();
        let user = self.users.get_user_by_uid(uid)?;
        Some(user.name().to_string_lossy().into_owned())
    }

    fn execute(&mut self, operation: &Operation) -> Result<()> {
        match operation {
            Operation::Run(command) => self.run(command),
            Operation::CreateDirectory { path, owner } => self.create_directory(path, owner),
            Operation::SetOwner { path, owner } => self.set_owner(path, owner),
        }
    }
}

/// Parses the raw (`-r`) output of `findmnt -o SOURCE,TARGET`
///
/// Sources are dataset names, with any bind-mounted sub-path in brackets
/// (`tank/home[/alice]`). They are turned into the path within the pool filesystem
/// (`/tank/home/alice`).
fn parse_findmnt(output: &str) -> Vec<ActiveMount> {
    static BRACKETS: OnceLock<Regex> = OnceLock::new();
    let brackets = BRACKETS.get_or_init(|| Regex::new(r"[\[\]]").expect("valid pattern"));

    let mut mounts = Vec::new();
    for line in output.lines() {
        let Some((source, target)) = line.trim().split_once(' ') else {
            if !line.trim().is_empty() {
                tracing::warn!("Ignoring unexpected findmnt line: {line:?}");
            }
            continue;
        };
        let source = unescape(source);
        let source = brackets.replace_all(source.trim_start_matches('/'), "");
        mounts.push(ActiveMount {
            source: Utf8PathBuf::from(format!("/{source}")),
            target: Utf8PathBuf::from(unescape(target.trim())),
        });
    }
    tracing::debug!("Existing mounts: {mounts:?}");
    mounts
}

/// Decodes the `\xNN` escapes findmnt uses for unsafe characters in raw output
fn unescape(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'\\' && bytes.get(index + 1) == Some(&b'x') {
            let hex = bytes.get(index + 2..index + 4).and_then(|hex| {
                std::str::from_utf8(hex)
                    .ok()
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            });
            if let Some(byte) = hex {
                decoded.push(byte);
                index += 4;
                continue;
            }
        }
        decoded.push(bytes[index]);
        index += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_pool_and_bind_mounts() {
        let mounts = parse_findmnt(concat!(
            "tank /tank\n",
            "tank/home /tank/home\n",
            "tank/home[/alice] /home/alice\n",
        ));
        assert_eq!(
            mounts,
            vec![
                ActiveMount {
                    source: "/tank".into(),
                    target: "/tank".into()
                },
                ActiveMount {
                    source: "/tank/home".into(),
                    target: "/tank/home".into()
                },
                ActiveMount {
                    source: "/tank/home/alice".into(),
                    target: "/home/alice".into()
                },
            ]
        );
    }

    #[test]
    fn parse_escaped_target() {
        let mounts = parse_findmnt("tank/media /srv/my\\x20media\n\n");
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].target, "/srv/my media");
    }

    #[test]
    fn unescape_leaves_plain_text() {
        assert_eq!(unescape("/plain/path"), "/plain/path");
        assert_eq!(unescape("back\\slash"), "back\\slash");
        assert_eq!(unescape("bad\\xZZ"), "bad\\xZZ");
        assert_eq!(unescape("tab\\x09"), "tab\t");
    }
}
