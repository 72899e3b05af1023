use std::fmt::Display;

use zolcrypt_config::Action;
use zolcrypt_host::{Host, Operation};

use crate::Result;

/// The component an operation was issued for, as shown in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    /// Encrypted devices
    Luks,
    /// Pools
    Zpool,
    /// Datasets
    Zfs,
    /// Bind mounts
    Mount,
}

impl Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Layer::Luks => "LUKS",
            Layer::Zpool => "zpool",
            Layer::Zfs => "zfs",
            Layer::Mount => "mount",
        })
    }
}

/// An operation handed to the host (or that would have been, when simulating)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issued {
    /// The layer that issued it
    pub layer: Layer,
    /// The action being applied at the time
    pub action: Action,
    /// The operation itself
    pub operation: Operation,
}

impl Display for Issued {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.layer, self.action, self.operation)
    }
}

/// Every operation issued during a run, in order
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Report {
    issued: Vec<Issued>,
    simulated: bool,
}

impl Report {
    /// The issued operations
    pub fn issued(&self) -> &[Issued] {
        &self.issued
    }

    /// Each issued operation formatted as it was logged
    pub fn lines(&self) -> Vec<String> {
        self.issued.iter().map(ToString::to_string).collect()
    }

    /// Number of issued operations
    pub fn len(&self) -> usize {
        self.issued.len()
    }

    /// Returns true if the stack was already in the requested state
    pub fn is_empty(&self) -> bool {
        self.issued.is_empty()
    }

    /// Whether the operations were only logged
    pub fn simulated(&self) -> bool {
        self.simulated
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.issued.len(), self.simulated) {
            (0, _) => write!(f, "Nothing to do"),
            (1, false) => write!(f, "Applied 1 operation"),
            (count, false) => write!(f, "Applied {count} operations"),
            (1, true) => write!(f, "Simulated 1 operation"),
            (count, true) => write!(f, "Simulated {count} operations"),
        }
    }
}

/// Hands operations to the host, one at a time, stopping at the first failure
pub struct Runner<'h, H> {
    host: &'h mut H,
    report: Report,
}

impl<'h, H: Host> Runner<'h, H> {
    /// Creates a runner; when `simulate` is set operations are logged but never executed
    pub fn new(host: &'h mut H, simulate: bool) -> Self {
        Runner {
            host,
            report: Report {
                issued: Vec::new(),
                simulated: simulate,
            },
        }
    }

    /// Read access to the host, for inspecting its current state
    pub fn host(&self) -> &H {
        &*self.host
    }

    /// Logs the operation, then executes it unless simulating
    pub fn run(&mut self, layer: Layer, action: Action, operation: Operation) -> Result<()> {
        let issued = Issued {
            layer,
            action,
            operation,
        };
        if self.report.simulated {
            tracing::info!("{issued} (simulated)");
        } else {
            tracing::info!("{issued}");
            self.host.execute(&issued.operation)?;
        }
        self.report.issued.push(issued);
        Ok(())
    }

    /// Ends the run, returning what was issued
    pub fn finish(self) -> Report {
        self.report
    }
}
