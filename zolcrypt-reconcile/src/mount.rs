//! The bind mount layer
//!
//! Mount entries are templates; a rule whose source or target mentions `{user}` is applied once
//! for every principal, otherwise once for `root`.

use camino::Utf8Path;
use zolcrypt_config::{Action, MountEntry};
use zolcrypt_host::{Command, Host, ROOT_PRINCIPAL};

use crate::{directory, Layer, Result, RunContext, Runner, Template};

/// A parsed mount entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRule {
    source: Template,
    target: Template,
    mkdirs: bool,
}

impl MountRule {
    /// Parses both templates of the entry
    pub fn parse(entry: &MountEntry) -> Result<Self> {
        Ok(MountRule {
            source: Template::parse(&entry.src)?,
            target: Template::parse(&entry.dst)?,
            mkdirs: entry.mkdirs,
        })
    }

    /// Template of the path made visible
    pub fn source(&self) -> &Template {
        &self.source
    }

    /// Template of the mount point
    pub fn target(&self) -> &Template {
        &self.target
    }

    /// Whether the mount point is created (and given to the principal) before mounting
    pub fn mkdirs(&self) -> bool {
        self.mkdirs
    }

    /// Returns true if the rule is applied once per principal
    pub fn is_per_user(&self) -> bool {
        self.source.has_user() || self.target.has_user()
    }
}

/// The command, if any, that brings the binding of `source` at `target` to the state of `action`
pub fn plan(action: Action, source: &Utf8Path, target: &Utf8Path, bound: bool) -> Option<Command> {
    match action {
        Action::Open | Action::Create if !bound => Some(
            Command::new("mount")
                .args(["-o", "bind", source.as_str(), target.as_str()]),
        ),
        Action::Close if bound => Some(Command::new("umount").arg(target.as_str())),
        _ => None,
    }
}

/// Applies `action` to one mount rule, for each principal it covers
pub fn apply<H: Host>(
    action: Action,
    rule: &MountRule,
    ctx: &mut RunContext,
    runner: &mut Runner<H>,
) -> Result<()> {
    let principals = if rule.is_per_user() {
        ctx.principals().to_vec()
    } else {
        vec![ROOT_PRINCIPAL.to_owned()]
    };
    for principal in &principals {
        let source = rule.source.render(principal, &ctx.tags)?;
        let target = rule.target.render(principal, &ctx.tags)?;

        // A mount point in use shows the owner of what is mounted on it
        let covered = ctx.mounts.source_of(&target).is_some();
        if rule.mkdirs && !covered {
            if let Some(operation) = directory::ensure(runner.host(), ctx, &target, principal)? {
                runner.run(Layer::Mount, action, operation)?;
            }
            ctx.mark_ensured(&target);
        }

        let bound = ctx.mounts.is_bound(&source, &target);
        match plan(action, &source, &target, bound) {
            Some(command) => {
                runner.run(Layer::Mount, action, command.into())?;
                match action {
                    Action::Close => ctx.mounts.unbind(&target),
                    Action::Open | Action::Create => ctx.mounts.bind(&source, &target),
                }
            }
            None => tracing::debug!("Nothing to {action} for {target} ({principal})"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(src: &str, dst: &str) -> MountEntry {
        MountEntry {
            src: src.into(),
            dst: dst.into(),
            mkdirs: false,
        }
    }

    #[test]
    fn per_user_rules() -> Result<()> {
        assert!(MountRule::parse(&entry("{home}/{user}", "/home/{user}"))?.is_per_user());
        assert!(MountRule::parse(&entry("{home}", "/home/{user}"))?.is_per_user());
        assert!(MountRule::parse(&entry("{home}/{user}", "/srv/all"))?.is_per_user());
        assert!(!MountRule::parse(&entry("{media}", "/srv/media"))?.is_per_user());
        Ok(())
    }

    #[test]
    fn bind_decisions() {
        let (source, target) = (Utf8Path::new("/tank/home"), Utf8Path::new("/home/alice"));
        assert_eq!(
            plan(Action::Open, source, target, false).map(|c| c.to_string()),
            Some("mount -o bind /tank/home /home/alice".into())
        );
        assert_eq!(
            plan(Action::Create, source, target, false).map(|c| c.to_string()),
            Some("mount -o bind /tank/home /home/alice".into())
        );
        assert_eq!(plan(Action::Open, source, target, true), None);
        assert_eq!(
            plan(Action::Close, source, target, true).map(|c| c.to_string()),
            Some("umount /home/alice".into())
        );
        assert_eq!(plan(Action::Close, source, target, false), None);
    }
}
