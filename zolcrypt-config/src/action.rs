use std::{fmt::Display, str::FromStr};

use thiserror::Error;

/// The target state a run reconciles the storage stack towards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Format devices, build pools and datasets, then open everything
    Create,
    /// Unlock devices, import pools and bind-mount paths
    Open,
    /// Unmount paths, export pools and lock devices
    Close,
}

impl Action {
    /// All supported actions, in the order they are listed to users
    pub const ALL: [Action; 3] = [Action::Create, Action::Open, Action::Close];

    /// The name of the action as given on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Open => "open",
            Action::Close => "close",
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when an action name is not one of `create`, `open` or `close`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported action \"{0}\" (expected one of: create, open, close)")]
pub struct UnsupportedActionError(pub String);

impl FromStr for Action {
    type Err = UnsupportedActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| UnsupportedActionError(s.to_owned()))
    }
}
