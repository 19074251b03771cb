use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub const DEFAULT_STATE_FILE: &str = "azurerm-network.tfstate";

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Args, Debug)]
pub struct GlobalArgs {
    /// Bearer token for Azure Resource Manager
    #[arg(long, global = true, env = "ARM_ACCESS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[arg(long, global = true, env = "ARM_SUBSCRIPTION_ID")]
    pub subscription_id: Option<String>,

    /// Resource Manager base URL
    #[arg(long, global = true, env = "ARM_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Provider config file [default: <config dir>/azurerm-network/config.json]
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, default_value = DEFAULT_STATE_FILE)]
    pub state: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create, update or replace one resource from a JSON attribute file
    Apply(ApplyArgs),
    /// Re-read every resource in state, dropping those that no longer exist
    Refresh,
    /// Delete one resource and remove it from state
    Destroy(AddressArgs),
    /// Adopt an existing object into state
    Import(ImportArgs),
    /// Show the resources in state
    List,
    /// Show the supported resource types
    Resources,
}

#[derive(clap::Args, Debug)]
pub struct AddressArgs {
    /// Resource type, e.g. azurerm_subnet
    #[arg(long = "type")]
    pub resource_type: String,

    #[arg(long)]
    pub name: String,
}

#[derive(clap::Args, Debug)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub address: AddressArgs,

    /// JSON object with the resource arguments
    #[arg(long)]
    pub attributes: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct ImportArgs {
    #[command(flatten)]
    pub address: AddressArgs,

    /// ARM resource ID, or `parentId|childId` for associations
    #[arg(long)]
    pub id: String,
}
