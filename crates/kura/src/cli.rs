use clap::ValueEnum;
use kura_core::storage::RoamingType;

/// Roaming classification names accepted on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RoamingArg {
    /// Sync for this user on every machine
    PerUser,
    /// Sync only between machines running the same platform
    PerPlatform,
    /// Never leaves this machine
    Disabled,
}

impl From<RoamingArg> for RoamingType {
    fn from(arg: RoamingArg) -> Self {
        match arg {
            RoamingArg::PerUser => RoamingType::PerUser,
            RoamingArg::PerPlatform => RoamingType::PerPlatform,
            RoamingArg::Disabled => RoamingType::Disabled,
        }
    }
}
