use zolcrypt_host::Host;

use crate::{MountCache, Result};

/// Facts about the host gathered once at the start of a run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SystemState {
    /// Active mounts of the pool filesystem
    pub mounts: MountCache,
    /// Principals that per-user templates expand to
    pub principals: Vec<String>,
}

impl SystemState {
    /// Queries the host for its active mounts and principals
    ///
    /// Finding no mounts is fine; failing to enumerate principals is not.
    pub fn probe<H: Host>(host: &H) -> Result<Self> {
        let principals = host.principals()?;
        tracing::debug!("Principals: {principals:?}");
        let mounts: MountCache = host.pool_mounts()?.into_iter().collect();
        tracing::debug!("Existing mounts: {mounts:?}");
        Ok(SystemState { mounts, principals })
    }
}

#[cfg(test)]
mod tests {
    use zolcrypt_host::{HostError, MemoryHost};

    use super::*;
    use crate::Error;

    #[test]
    fn probe_empty_host() -> Result<()> {
        let state = SystemState::probe(&MemoryHost::new())?;
        assert!(state.mounts.is_empty());
        assert!(state.principals.is_empty());
        Ok(())
    }

    #[test]
    fn probe_principals() -> Result<()> {
        let host = MemoryHost::new().with_principal("bob").with_principal("alice");
        let state = SystemState::probe(&host)?;
        assert_eq!(state.principals, vec!["alice", "bob"]);
        Ok(())
    }

    #[test]
    fn probe_without_principal_root() {
        let host = MemoryHost::new().without_principal_root();
        assert!(matches!(
            SystemState::probe(&host),
            Err(Error::Host(HostError::EnvironmentProbe { .. }))
        ));
    }
}
