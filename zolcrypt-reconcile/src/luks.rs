//! The encrypted device layer
//!
//! Each configured device is unlocked to a mapper device named `crypt-<uuid>`, which is then
//! linked into [`CRYPT_DIR`] so pools can be imported from there.

use camino::{Utf8Path, Utf8PathBuf};
use zolcrypt_config::{Action, LuksEntry};
use zolcrypt_host::{Command, Host, CRYPT_DIR, MAPPER_DIR, ROOT_PRINCIPAL, UUID_DIR};

use crate::{directory, Layer, Result, RunContext, Runner};

/// The paths involved in unlocking one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    uuid: String,
}

impl Device {
    /// Describes the device with the given UUID
    pub fn new(uuid: impl Into<String>) -> Self {
        Device { uuid: uuid.into() }
    }

    /// The UUID of the raw device
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Name of the decrypted mapper device
    pub fn mapper_name(&self) -> String {
        format!("crypt-{}", self.uuid)
    }

    /// The raw, encrypted block device
    pub fn device_path(&self) -> Utf8PathBuf {
        Utf8Path::new(UUID_DIR).join(&self.uuid)
    }

    /// The decrypted mapper device
    pub fn mapper_path(&self) -> Utf8PathBuf {
        Utf8Path::new(MAPPER_DIR).join(self.mapper_name())
    }

    /// The link to the mapper device that pools are built from
    pub fn crypt_path(&self) -> Utf8PathBuf {
        Utf8Path::new(CRYPT_DIR).join(self.mapper_name())
    }
}

/// The commands that bring `device` to the state of `action`
pub fn plan(action: Action, device: &Device, mapper_exists: bool, force: bool) -> Vec<Command> {
    let open = || {
        vec![
            Command::new("cryptsetup")
                .arg("luksOpen")
                .arg(device.device_path().as_str())
                .arg(device.mapper_name()),
            Command::new("ln")
                .arg("-s")
                .arg(device.mapper_path().as_str())
                .arg(device.crypt_path().as_str()),
        ]
    };
    match action {
        Action::Open if !mapper_exists => open(),
        Action::Close if mapper_exists => vec![
            Command::new("cryptsetup")
                .arg("luksClose")
                .arg(device.mapper_name()),
            Command::new("rm").arg(device.crypt_path().as_str()),
        ],
        Action::Create if !mapper_exists || force => {
            let mut commands = vec![Command::new("cryptsetup")
                .arg("luksFormat")
                .arg(device.device_path().as_str())
                .arg(format!("--uuid={}", device.uuid))];
            commands.extend(open());
            commands
        }
        _ => vec![],
    }
}

/// Applies `action` to one configured device
///
/// The device's link path is added to the run's device list whether or not anything was done,
/// since pool creation needs every configured device.
pub fn apply<H: Host>(
    action: Action,
    entry: &LuksEntry,
    ctx: &mut RunContext,
    runner: &mut Runner<H>,
) -> Result<()> {
    let device = Device::new(&entry.uuid);
    let mapper_exists = runner.host().exists(device.mapper_path());
    let commands = plan(action, &device, mapper_exists, ctx.options().force);
    if commands.is_empty() {
        tracing::debug!("Nothing to {action} for {}", device.mapper_name());
    } else if action != Action::Close {
        let crypt_dir = Utf8Path::new(CRYPT_DIR);
        if let Some(operation) = directory::ensure(runner.host(), ctx, crypt_dir, ROOT_PRINCIPAL)? {
            runner.run(Layer::Luks, action, operation)?;
        }
        ctx.mark_ensured(crypt_dir);
    }
    for command in commands {
        runner.run(Layer::Luks, action, command.into())?;
    }
    ctx.devices.push(device.crypt_path());
    Ok(())
}
