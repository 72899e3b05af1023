use anyhow::Result;
use zolcrypt_config::{Action, ConfigFile};
use zolcrypt_host::MemoryHost;

use crate::{reconcile, RunOptions};

/// Reconciles `to` (a configuration text) onto a [`MemoryHost`], asserting the exact operations
/// issued, in order, and evaluating to the [`Report`](crate::Report)
///
/// Options are switched on with `with force` or `with simulate`.
macro_rules! assert_effect_of {
    {
        applying: $action:ident $(with $flag:ident)*
        to: $config:ident
        onto: $host:ident
        yields: $($line:literal)*
    } => {{
        #[allow(unused_mut)]
        let mut options = $crate::RunOptions::default();
        $(options.$flag = true;)*
        let config = zolcrypt_config::ConfigFile::try_from($config)?;
        let report = $crate::reconcile(
            zolcrypt_config::Action::$action,
            &config,
            options,
            &mut $host,
        )?;
        let expected: Vec<&str> = vec![$($line),*];
        assert_eq!(report.lines(), expected);
        report
    }};
}

/// One device, one dataset, and every principal's home bound onto the dataset
const STACK: &str = r#"
    LUKS = ["U1"]

    [[ZFS]]
    tag = "home"
    volume = "tank/home"

    [[Mount]]
    action = "bind"
    src = "/tank/home"
    dst = "/home/{user}"
    mkdirs = true
"#;

/// A machine with an unformatted device `U1` and principals `alice` and `bob`
fn fresh_host() -> MemoryHost {
    MemoryHost::new()
        .with_device("U1")
        .with_principal("alice")
        .with_principal("bob")
}

/// Builds `config` on `host`, then forgets the operations that took
fn created(mut host: MemoryHost, config: &str) -> Result<MemoryHost> {
    let config = ConfigFile::try_from(config)?;
    reconcile(Action::Create, &config, RunOptions::default(), &mut host)?;
    host.clear_history();
    Ok(host)
}

mod failures;
mod ordering;
