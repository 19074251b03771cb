//! azurerm-network - Azure networking resources for Terraform-style lifecycles
//!
//! Typed ARM resource IDs, a versioned Resource Manager client with
//! long-running operation polling, and create/read/update/delete for the
//! networking resource types, driven from a local state file.

pub mod azure;
pub mod cli;
pub mod config;
pub mod locks;
pub mod network;
pub mod output;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod terraform;
pub mod validate;

mod error;

pub use azure::{ArmClient, ArmError};
pub use config::ProviderConfig;
pub use error::ProviderError;
pub use provider::{Action, Provider};
pub use resource::{Clients, Resource, ResourceData, ResourceError, Timeouts};
pub use terraform::{StateFile, StateResource};
