use camino::Utf8Path;
use zolcrypt_host::{Host, HostError, Operation};

use crate::{Result, RunContext};

/// Decides what, if anything, is needed for `path` to be a directory owned by `owner`
///
/// Directories already handled earlier in the run are taken as done, so simulated runs do not
/// repeat themselves.
pub(crate) fn ensure<H: Host>(
    host: &H,
    ctx: &RunContext,
    path: &Utf8Path,
    owner: &str,
) -> Result<Option<Operation>> {
    if !host.has_principal(owner) {
        return Err(HostError::PrincipalNotFound(owner.to_owned()).into());
    }
    if ctx.was_ensured(path) {
        return Ok(None);
    }
    Ok(match host.owner(path) {
        None => Some(Operation::CreateDirectory {
            path: path.to_owned(),
            owner: owner.to_owned(),
        }),
        Some(current) if current != owner => Some(Operation::SetOwner {
            path: path.to_owned(),
            owner: owner.to_owned(),
        }),
        Some(_) => None,
    })
}

#[cfg(test)]
mod tests {
    use zolcrypt_host::MemoryHost;

    use super::*;
    use crate::{Error, RunOptions, SystemState};

    fn context() -> RunContext {
        RunContext::new(SystemState::default(), RunOptions::default())
    }

    #[test]
    fn missing_directory_is_created() -> Result<()> {
        let host = MemoryHost::new().with_account("alice");
        let op = ensure(&host, &context(), Utf8Path::new("/srv/alice"), "alice")?;
        assert_eq!(
            op,
            Some(Operation::CreateDirectory {
                path: "/srv/alice".into(),
                owner: "alice".into()
            })
        );
        Ok(())
    }

    #[test]
    fn wrong_owner_is_corrected() -> Result<()> {
        let host = MemoryHost::new()
            .with_account("alice")
            .with_directory("/srv/alice", "root");
        let op = ensure(&host, &context(), Utf8Path::new("/srv/alice"), "alice")?;
        assert_eq!(
            op,
            Some(Operation::SetOwner {
                path: "/srv/alice".into(),
                owner: "alice".into()
            })
        );
        Ok(())
    }

    #[test]
    fn correct_directory_needs_nothing() -> Result<()> {
        let host = MemoryHost::new().with_principal("alice");
        assert_eq!(
            ensure(&host, &context(), Utf8Path::new("/home/alice"), "alice")?,
            None
        );

        let host = MemoryHost::new().with_account("alice");
        let mut ctx = context();
        ctx.mark_ensured(Utf8Path::new("/srv/alice"));
        assert_eq!(
            ensure(&host, &ctx, Utf8Path::new("/srv/alice"), "alice")?,
            None
        );
        Ok(())
    }

    #[test]
    fn unknown_owner() {
        let host = MemoryHost::new();
        assert!(matches!(
            ensure(&host, &context(), Utf8Path::new("/srv/carol"), "carol"),
            Err(Error::Host(HostError::PrincipalNotFound(name))) if name == "carol"
        ));
    }
}
