mod client;
mod error;
pub mod ids;
mod poller;

pub use client::ArmClient;
pub use error::ArmError;
pub use poller::{LongRunningOperation, OperationKind};

/// Lowercases and strips spaces so `West Europe` and `westeurope` compare equal.
pub fn normalize_location(location: &str) -> String {
    location.replace(' ', "").to_lowercase()
}
