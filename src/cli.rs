mod args;

pub use args::{AddressArgs, ApplyArgs, Cli, Command, DEFAULT_STATE_FILE, GlobalArgs, ImportArgs};

use std::path::Path;

use serde_json::{Map, Value};

use crate::azure::ArmClient;
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::network;
use crate::output;
use crate::provider::Provider;
use crate::resource::{Clients, ResourceData};
use crate::terraform::{StateFile, StateResource};

pub async fn run(cli: Cli) -> Result<(), ProviderError> {
    let Cli { global, command } = cli;

    match command {
        Command::List => {
            let state = StateFile::load(&global.state)?;
            println!("{}", output::state_table(&state));
        }
        Command::Resources => {
            let types: Vec<&str> = network::resources().iter().map(|r| r.type_name()).collect();
            println!("{}", output::resource_types_table(types));
        }
        Command::Apply(args) => {
            let provider = connect(&global)?;
            let mut state = StateFile::load(&global.state)?;
            let config = read_attributes(&args.attributes)?;

            let prior = state
                .find(&args.address.resource_type, &args.address.name)
                .map(|r| (r.id.clone(), r.attributes.clone()));

            let (action, d) = provider
                .apply(&args.address.resource_type, prior, config)
                .await?;
            tracing::info!(address = %address(&args.address), ?action, id = d.id(), "applied");

            record(&mut state, &args.address, d);
            state.save(&global.state)?;
        }
        Command::Refresh => {
            let provider = connect(&global)?;
            let mut state = StateFile::load(&global.state)?;

            let mut refreshed = Vec::with_capacity(state.resources.len());
            for resource in std::mem::take(&mut state.resources) {
                let current = provider
                    .refresh(&resource.resource_type, &resource.id, resource.attributes.clone())
                    .await?;
                match current {
                    Some(d) => refreshed.push(StateResource {
                        attributes: d.into_attributes(),
                        ..resource
                    }),
                    None => tracing::warn!(address = %resource.address(), "removed from state, no longer exists"),
                }
            }

            state.resources = refreshed;
            state.save(&global.state)?;
        }
        Command::Destroy(args) => {
            let provider = connect(&global)?;
            let mut state = StateFile::load(&global.state)?;

            let resource = state
                .remove(&args.resource_type, &args.name)
                .ok_or_else(|| ProviderError::NotInState(address(&args)))?;
            provider
                .destroy(&resource.resource_type, &resource.id, resource.attributes)
                .await?;

            state.save(&global.state)?;
        }
        Command::Import(args) => {
            let provider = connect(&global)?;
            let mut state = StateFile::load(&global.state)?;

            let d = provider.import(&args.address.resource_type, &args.id).await?;
            tracing::info!(address = %address(&args.address), id = d.id(), "imported");

            record(&mut state, &args.address, d);
            state.save(&global.state)?;
        }
    }

    Ok(())
}

/// Flags and environment first, then the config file.
fn connect(global: &GlobalArgs) -> Result<Provider, ProviderError> {
    let config = match &global.config {
        Some(path) => ProviderConfig::load(path)?,
        None => match ProviderConfig::default_path() {
            Some(path) => ProviderConfig::load(&path)?,
            None => ProviderConfig::default(),
        },
    };

    let token = global
        .token
        .clone()
        .ok_or(ProviderError::MissingSetting("ARM_ACCESS_TOKEN"))?;
    let subscription_id = global
        .subscription_id
        .clone()
        .or_else(|| config.subscription_id.clone())
        .ok_or(ProviderError::MissingSetting("ARM_SUBSCRIPTION_ID"))?;

    let mut arm = match global.endpoint.clone().or_else(|| config.endpoint.clone()) {
        Some(endpoint) => ArmClient::with_base_url(token, subscription_id, endpoint)?,
        None => ArmClient::new(token, subscription_id)?,
    };
    if let Some(interval) = config.poll_interval() {
        arm = arm.with_poll_interval(interval);
    }

    Ok(Provider::new(Clients::new(arm), config))
}

fn read_attributes(path: &Path) -> Result<Map<String, Value>, ProviderError> {
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|source| ProviderError::Attributes {
        path: path.display().to_string(),
        source,
    })
}

fn address(args: &AddressArgs) -> String {
    format!("{}.{}", args.resource_type, args.name)
}

/// Stores `d` under `target`. An object whose ID was cleared is dropped.
fn record(state: &mut StateFile, target: &AddressArgs, d: ResourceData) {
    if d.id().is_empty() {
        tracing::warn!(address = %address(target), "removed from state, no longer exists");
        state.remove(&target.resource_type, &target.name);
        return;
    }
    state.upsert(to_state(target, d));
}

fn to_state(address: &AddressArgs, d: ResourceData) -> StateResource {
    StateResource {
        resource_type: address.resource_type.clone(),
        name: address.name.clone(),
        id: d.id().to_string(),
        attributes: d.into_attributes(),
    }
}
