use anyhow::Result;
use zolcrypt_config::{Action, ConfigFile};
use zolcrypt_host::{Host, HostError, MemoryHost};

use super::{fresh_host, STACK};
use crate::{reconcile, reconcile_named, Error, RunOptions};

fn run(action: Action, config: &str, host: &mut MemoryHost) -> Result<crate::Report, Error> {
    let config = ConfigFile::try_from(config).expect("test configuration parses");
    reconcile(action, &config, RunOptions::default(), host)
}

#[test]
fn first_failure_stops_the_run() {
    let mut host = fresh_host().failing_on("zfs create");
    let result = run(Action::Create, STACK, &mut host);
    assert!(matches!(
        result,
        Err(Error::Host(HostError::CommandExecution { ref command, code: Some(1) }))
            if command == "zfs create tank/home"
    ));
    // Earlier layers are left as they are, later ones never start
    assert!(host.pool("tank").is_some());
    assert_eq!(host.mounted_at("/home/alice"), None);
    assert_eq!(host.history().len(), 6);
}

#[test]
fn rerun_after_failure_resumes() -> Result<()> {
    let mut host = fresh_host().failing_on("mount -o bind /tank/home /home/bob");
    assert!(run(Action::Create, STACK, &mut host).is_err());
    assert_eq!(host.mounted_at("/home/alice").map(|p| p.as_str()), Some("/tank/home"));

    host.clear_failures();
    let report = run(Action::Create, STACK, &mut host)?;
    assert_eq!(
        report.lines(),
        vec!["mount create: mount -o bind /tank/home /home/bob"]
    );
    Ok(())
}

#[test]
fn unsupported_action_is_rejected_before_any_work() {
    let mut host = fresh_host();
    let config = ConfigFile::try_from(STACK).expect("test configuration parses");
    let result = reconcile_named("destroy", &config, RunOptions::default(), &mut host);
    assert!(matches!(result, Err(Error::UnsupportedAction(ref e)) if e.0 == "destroy"));
    assert!(host.history().is_empty());
}

#[test]
fn missing_principal_root() {
    let mut host = MemoryHost::new().with_device("U1").without_principal_root();
    assert!(matches!(
        run(Action::Open, STACK, &mut host),
        Err(Error::Host(HostError::EnvironmentProbe { .. }))
    ));
    assert!(host.history().is_empty());
}

#[test]
fn home_without_account() {
    let mut host = MemoryHost::new()
        .with_device("U1")
        .with_directory("/home/ghost", "root");
    assert!(matches!(
        run(Action::Create, STACK, &mut host),
        Err(Error::Host(HostError::PrincipalNotFound(ref name))) if name == "ghost"
    ));
    assert_eq!(host.mounted_at("/home/ghost"), None);
}

#[test]
fn unknown_tag_is_rejected_before_any_work() {
    const UNKNOWN: &str = r#"
        LUKS = ["U1"]
        ZFS = [{ tag = "home", volume = "tank/home" }]
        Mount = [{ src = "{media}", dst = "/srv/media" }]
    "#;
    let mut host = fresh_host();
    assert!(matches!(
        run(Action::Create, UNKNOWN, &mut host),
        Err(Error::PathResolution { ref placeholder, ref template })
            if placeholder == "media" && template == "{media}"
    ));
    assert!(host.history().is_empty());
}

#[test]
fn malformed_template_is_rejected_before_any_work() {
    const MALFORMED: &str = r#"
        LUKS = ["U1"]
        ZFS = [{ tag = "home", volume = "tank/home" }]
        Mount = [{ src = "{home", dst = "/srv/home" }]
    "#;
    let mut host = fresh_host();
    assert!(matches!(
        run(Action::Open, MALFORMED, &mut host),
        Err(Error::InvalidTemplate { .. })
    ));
    assert!(host.history().is_empty());
}

#[test]
fn pool_without_devices() {
    const NO_DEVICES: &str = r#"
        ZFS = [{ tag = "home", volume = "tank/home" }]
    "#;
    let mut host = fresh_host();
    assert!(matches!(
        run(Action::Create, NO_DEVICES, &mut host),
        Err(Error::NoDevices { ref pool }) if pool == "tank"
    ));
    assert!(host.history().is_empty());
}

#[test]
fn export_refused_while_foreign_mount_remains() {
    let mut host = fresh_host();
    run(Action::Create, STACK, &mut host).expect("stack is created");
    // A bind mount the configuration does not know about keeps the pool busy
    host.execute(&zolcrypt_host::Operation::CreateDirectory {
        path: "/mnt/extra".into(),
        owner: "root".into(),
    })
    .expect("directory is created");
    host.execute(
        &zolcrypt_host::Command::new("mount")
            .args(["-o", "bind", "/tank/home", "/mnt/extra"])
            .into(),
    )
    .expect("extra mount is made");

    let result = run(Action::Close, STACK, &mut host);
    assert!(matches!(
        result,
        Err(Error::Host(HostError::CommandExecution { ref command, .. }))
            if command == "zpool export tank"
    ));
    assert_eq!(host.mounted_at("/home/alice"), None);
    assert!(host.exists("/dev/mapper/crypt-U1"));
}
