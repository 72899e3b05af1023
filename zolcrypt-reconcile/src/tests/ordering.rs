use anyhow::Result;
use zolcrypt_config::{Action, ConfigFile};

use super::STACK;
use crate::{phases, validate, Error, Phase};

#[test]
fn build_up_order() {
    for action in [Action::Create, Action::Open] {
        assert_eq!(
            phases(action),
            vec![
                Phase::Luks(action),
                Phase::Zfs(Some(action)),
                Phase::Mount(action)
            ]
        );
    }
}

#[test]
fn teardown_order() {
    let phases = phases(Action::Close);
    assert_eq!(
        phases,
        vec![
            Phase::Zfs(None),
            Phase::Mount(Action::Close),
            Phase::Zfs(Some(Action::Close)),
            Phase::Luks(Action::Close),
        ]
    );
    let names: Vec<String> = phases.iter().map(ToString::to_string).collect();
    assert_eq!(names, vec!["ZFS(none)", "Mount(close)", "ZFS(close)", "LUKS(close)"]);
}

#[test]
fn tags_resolve_before_unmounting() -> Result<()> {
    const TAGGED: &str = r#"
        LUKS = ["U1"]
        ZFS = [{ tag = "home", volume = "tank/home" }]
        Mount = [{ src = "{home}", dst = "/home/{user}" }]
    "#;
    let mut host = super::created(super::fresh_host(), TAGGED)?;
    assert_effect_of! {
        applying: Close
        to: TAGGED
        onto: host
        yields:
            "mount close: umount /home/alice"
            "mount close: umount /home/bob"
            "zpool close: zpool export tank"
            "LUKS close: cryptsetup luksClose crypt-U1"
            "LUKS close: rm /dev/zol_crypt/crypt-U1"
    };
    Ok(())
}

#[test]
fn later_entries_rebind_tags() -> Result<()> {
    const REBOUND: &str = r#"
        LUKS = ["U1"]
        ZFS = [
            { tag = "data", volume = "tank/first" },
            { tag = "data", volume = "tank/second" },
        ]
        Mount = [{ src = "{data}", dst = "/srv/data", mkdirs = true }]
    "#;
    let mut host = zolcrypt_host::MemoryHost::new().with_device("U1");
    assert_effect_of! {
        applying: Create
        to: REBOUND
        onto: host
        yields:
            "LUKS create: mkdir -p /dev/zol_crypt [root]"
            "LUKS create: cryptsetup luksFormat /dev/disk/by-uuid/U1 --uuid=U1"
            "LUKS create: cryptsetup luksOpen /dev/disk/by-uuid/U1 crypt-U1"
            "LUKS create: ln -s /dev/mapper/crypt-U1 /dev/zol_crypt/crypt-U1"
            "zpool create: zpool create -f -o ashift=12 tank /dev/zol_crypt/crypt-U1"
            "zfs create: zfs create tank/first"
            "zfs create: zfs create tank/second"
            "mount create: mkdir -p /srv/data [root]"
            "mount create: mount -o bind /tank/second /srv/data"
    };
    Ok(())
}

#[test]
fn validation_accepts_stack() -> Result<()> {
    let config = ConfigFile::try_from(STACK)?;
    let rules = validate(&config, Action::Create)?;
    assert_eq!(rules.len(), 1);
    assert!(rules[0].is_per_user());
    assert!(rules[0].mkdirs());
    Ok(())
}

#[test]
fn multiple_pools_only_rejected_on_create() -> Result<()> {
    let config = ConfigFile::try_from(
        r#"
        LUKS = ["U1", "U2"]
        ZFS = [
            { tag = "home", volume = "tank/home" },
            { tag = "media", volume = "vault/media" },
        ]
        "#,
    )?;
    assert!(matches!(
        validate(&config, Action::Create),
        Err(Error::AmbiguousTopology { pools, devices: 2 }) if pools == ["tank", "vault"]
    ));
    assert!(validate(&config, Action::Open).is_ok());
    assert!(validate(&config, Action::Close).is_ok());
    Ok(())
}
