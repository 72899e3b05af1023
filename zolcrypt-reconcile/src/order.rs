use std::fmt::Display;

use tracing::{span, Level};
use zolcrypt_config::{Action, ConfigFile};
use zolcrypt_host::Host;

use crate::{
    luks,
    mount::{self, MountRule},
    zfs, Error, Report, Result, RunContext, RunOptions, Runner, SystemState, USER_PLACEHOLDER,
};

/// One pass over a section of the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Every LUKS entry
    Luks(Action),
    /// Every ZFS entry; with no action only tags are bound
    Zfs(Option<Action>),
    /// Every Mount entry
    Mount(Action),
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Luks(action) => write!(f, "LUKS({action})"),
            Phase::Zfs(Some(action)) => write!(f, "ZFS({action})"),
            Phase::Zfs(None) => write!(f, "ZFS(none)"),
            Phase::Mount(action) => write!(f, "Mount({action})"),
        }
    }
}

/// The passes made for `action`, in order
///
/// Layers are built up from devices to mounts. Closing tears them down in reverse, preceded by a
/// pass that binds every tag so that mount paths can be resolved.
pub fn phases(action: Action) -> Vec<Phase> {
    let mut phases = vec![
        Phase::Luks(action),
        Phase::Zfs(Some(action)),
        Phase::Mount(action),
    ];
    if action == Action::Close {
        phases.push(Phase::Zfs(None));
        phases.reverse();
    }
    phases
}

/// Checks the configuration before anything is touched, returning the parsed mount rules
///
/// Every placeholder must be `{user}` or a tag declared in the ZFS section. Creation is limited
/// to a single pool, as each pool would otherwise be built from every configured device.
pub fn validate(config: &ConfigFile, action: Action) -> Result<Vec<MountRule>> {
    let rules = config
        .mount
        .iter()
        .map(MountRule::parse)
        .collect::<Result<Vec<_>>>()?;
    for template in rules.iter().flat_map(|rule| [rule.source(), rule.target()]) {
        let unknown = template
            .placeholders()
            .find(|name| *name != USER_PLACEHOLDER && !config.zfs.iter().any(|e| e.tag == *name));
        if let Some(name) = unknown {
            return Err(Error::PathResolution {
                placeholder: name.to_owned(),
                template: template.source().to_owned(),
            });
        }
    }
    if action == Action::Create {
        let pools = config.pools();
        if pools.len() > 1 {
            return Err(Error::AmbiguousTopology {
                pools: pools.into_iter().map(str::to_owned).collect(),
                devices: config.luks.len(),
            });
        }
    }
    Ok(rules)
}

/// Brings the storage stack described by `config` to the state of `action`
///
/// The host is probed once, then each phase walks its section in file order. The first failure
/// ends the run; nothing done before it is undone.
pub fn reconcile<H: Host>(
    action: Action,
    config: &ConfigFile,
    options: RunOptions,
    host: &mut H,
) -> Result<Report> {
    let span = span!(Level::DEBUG, "reconcile", action = action.as_str());
    let _guard = span.enter();

    let rules = validate(config, action)?;
    let state = SystemState::probe(host)?;
    let mut ctx = RunContext::new(state, options);
    let mut runner = Runner::new(host, options.simulate);

    for phase in phases(action) {
        let span = span!(Level::DEBUG, "phase", phase = %phase);
        let _guard = span.enter();
        match phase {
            Phase::Luks(action) => {
                for entry in &config.luks {
                    luks::apply(action, entry, &mut ctx, &mut runner)?;
                }
            }
            Phase::Zfs(action) => {
                for entry in &config.zfs {
                    zfs::apply(action, entry, &mut ctx, &mut runner)?;
                }
            }
            Phase::Mount(action) => {
                for rule in &rules {
                    mount::apply(action, rule, &mut ctx, &mut runner)?;
                }
            }
        }
    }
    Ok(runner.finish())
}

/// As [`reconcile`], with the action given by name
pub fn reconcile_named<H: Host>(
    action: &str,
    config: &ConfigFile,
    options: RunOptions,
    host: &mut H,
) -> Result<Report> {
    let action: Action = action.parse()?;
    reconcile(action, config, options, host)
}
