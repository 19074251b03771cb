//! Resource registry and lifecycle dispatcher.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::network;
use crate::resource::{Clients, Resource, ResourceData, ResourceError, Timeouts};

pub struct Provider {
    clients: Clients,
    config: ProviderConfig,
    resources: BTreeMap<&'static str, Box<dyn Resource>>,
}

/// What `apply` did to reach the desired configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
    Replace,
    /// Nothing changed. The object was only re-read.
    Unchanged,
}

async fn with_timeout<F>(operation: String, timeout: Duration, fut: F) -> Result<(), ResourceError>
where
    F: Future<Output = Result<(), ResourceError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| ResourceError::Timeout { operation, timeout })?
}

impl Provider {
    pub fn new(clients: Clients, config: ProviderConfig) -> Self {
        let resources = network::resources()
            .into_iter()
            .map(|r| (r.type_name(), r))
            .collect();
        Self {
            clients,
            config,
            resources,
        }
    }

    pub fn resource_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.resources.keys().copied()
    }

    pub fn resource(&self, resource_type: &str) -> Result<&dyn Resource, ProviderError> {
        self.resources
            .get(resource_type)
            .map(|r| r.as_ref())
            .ok_or_else(|| ProviderError::UnknownResourceType(resource_type.to_string()))
    }

    pub fn timeouts(&self, resource_type: &str) -> Result<Timeouts, ProviderError> {
        let resource = self.resource(resource_type)?;
        Ok(self.config.timeouts_for(resource_type, resource.timeouts()))
    }

    /// Drives the remote object towards `config`.
    ///
    /// Without `prior` the object is created. With `prior` and no changed
    /// argument it is only re-read, and created again if it vanished.
    /// Otherwise it is updated in place, or destroyed and recreated when a
    /// `force_new` argument changed.
    pub async fn apply(
        &self,
        resource_type: &str,
        prior: Option<(String, Map<String, Value>)>,
        mut config: Map<String, Value>,
    ) -> Result<(Action, ResourceData), ProviderError> {
        let resource = self.resource(resource_type)?;
        let timeouts = self.timeouts(resource_type)?;
        let schema = resource.schema();

        schema.apply_defaults(&mut config);
        schema.validate(&config).map_err(ResourceError::from)?;
        resource
            .validate(&ResourceData::new(config.clone()))
            .map_err(ResourceError::from)?;

        let Some((id, prior_attrs)) = prior else {
            let d = self.create(resource, config, timeouts.create).await?;
            return Ok((Action::Create, d));
        };

        let mut d =
            ResourceData::for_update(id.clone(), prior_attrs.clone(), config.clone(), &schema);
        let changed = schema
            .attributes()
            .iter()
            .filter(|a| !a.is_read_only())
            .any(|a| d.has_change(a.name));

        if !changed {
            tracing::debug!(resource_type, id = %id, "no changes, refreshing");
            with_timeout(
                format!("reading {}", resource_type),
                timeouts.read,
                resource.read(&self.clients, &mut d),
            )
            .await?;
            if d.id().is_empty() {
                tracing::warn!(resource_type, id = %id, "object no longer exists, creating it");
                let d = self.create(resource, config, timeouts.create).await?;
                return Ok((Action::Create, d));
            }
            return Ok((Action::Unchanged, d));
        }

        let replace = !schema.supports_update()
            || schema.force_new_attributes().any(|key| d.has_change(key));

        if replace {
            tracing::info!(resource_type, id = %id, "replacing resource");
            self.destroy(resource_type, &id, prior_attrs).await?;
            let d = self.create(resource, config, timeouts.create).await?;
            return Ok((Action::Replace, d));
        }

        tracing::info!(resource_type, id = d.id(), "updating resource");
        with_timeout(
            format!("updating {}", resource_type),
            timeouts.update,
            resource.update(&self.clients, &mut d),
        )
        .await?;
        Ok((Action::Update, d))
    }

    async fn create(
        &self,
        resource: &dyn Resource,
        config: Map<String, Value>,
        timeout: Duration,
    ) -> Result<ResourceData, ProviderError> {
        let resource_type = resource.type_name();
        tracing::info!(resource_type, "creating resource");

        let mut d = ResourceData::new(config);
        with_timeout(
            format!("creating {}", resource_type),
            timeout,
            resource.create(&self.clients, &mut d),
        )
        .await?;
        Ok(d)
    }

    /// Re-reads the remote object. `None` means it no longer exists.
    pub async fn refresh(
        &self,
        resource_type: &str,
        id: &str,
        attrs: Map<String, Value>,
    ) -> Result<Option<ResourceData>, ProviderError> {
        let resource = self.resource(resource_type)?;
        let timeouts = self.timeouts(resource_type)?;

        let mut d = ResourceData::from_state(id, attrs);
        with_timeout(
            format!("reading {}", resource_type),
            timeouts.read,
            resource.read(&self.clients, &mut d),
        )
        .await?;

        if d.id().is_empty() {
            return Ok(None);
        }
        Ok(Some(d))
    }

    pub async fn destroy(
        &self,
        resource_type: &str,
        id: &str,
        attrs: Map<String, Value>,
    ) -> Result<(), ProviderError> {
        let resource = self.resource(resource_type)?;
        let timeouts = self.timeouts(resource_type)?;
        tracing::info!(resource_type, id, "destroying resource");

        let mut d = ResourceData::from_state(id, attrs);
        with_timeout(
            format!("deleting {}", resource_type),
            timeouts.delete,
            resource.delete(&self.clients, &mut d),
        )
        .await?;
        Ok(())
    }

    /// Reads an existing object into state. The ID must have the type's format
    /// and the object must exist.
    pub async fn import(&self, resource_type: &str, id: &str) -> Result<ResourceData, ProviderError> {
        let resource = self.resource(resource_type)?;
        resource
            .validate_import_id(id)
            .map_err(ResourceError::from)?;

        self.refresh(resource_type, id, Map::new())
            .await?
            .ok_or_else(|| ProviderError::ImportNotFound {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::azure::ArmClient;
    use serde_json::json;

    fn provider(config: ProviderConfig) -> Provider {
        let arm = ArmClient::with_base_url(
            "token".to_string(),
            "sub".to_string(),
            "http://127.0.0.1:1".to_string(),
        )
        .unwrap();
        Provider::new(Clients::new(arm), config)
    }

    #[test]
    fn test_registers_every_resource_type() {
        let provider = provider(ProviderConfig::default());
        let types: Vec<_> = provider.resource_types().collect();
        assert_eq!(types.len(), 16);
        assert!(types.contains(&"azurerm_bastion_host"));
        assert!(types.contains(&"azurerm_web_application_firewall_policy"));
    }

    #[test]
    fn test_unknown_resource_type() {
        let provider = provider(ProviderConfig::default());
        assert!(matches!(
            provider.resource("azurerm_storage_account"),
            Err(ProviderError::UnknownResourceType(_))
        ));
    }

    #[test]
    fn test_timeouts_use_config_overrides() {
        let mut config = ProviderConfig::default();
        config.timeouts.insert(
            "azurerm_vpn_gateway".to_string(),
            crate::config::TimeoutOverrides {
                delete: Some(10),
                ..Default::default()
            },
        );
        let provider = provider(config);

        let t = provider.timeouts("azurerm_vpn_gateway").unwrap();
        assert_eq!(t.delete, Duration::from_secs(600));
        assert_eq!(t.create, Duration::from_secs(90 * 60));
    }

    #[tokio::test]
    async fn test_apply_rejects_invalid_schema_before_any_request() {
        let provider = provider(ProviderConfig::default());
        let config = json!({"name": "asg1", "location": "westeurope", "bogus": true});

        let err = provider
            .apply(
                "azurerm_application_security_group",
                None,
                config.as_object().cloned().unwrap(),
            )
            .await
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("\"bogus\" is not expected here"));
        assert!(message.contains("\"resource_group_name\" is required"));
    }

    #[tokio::test]
    async fn test_import_rejects_malformed_id() {
        let provider = provider(ProviderConfig::default());
        let err = provider
            .import("azurerm_route", "/subscriptions/sub/resourceGroups/rg1")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Resource(ResourceError::InvalidId(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout_is_reported_with_operation() {
        let err = with_timeout(
            "creating azurerm_vpn_gateway".to_string(),
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ResourceError::Timeout { .. }));
        assert!(err.to_string().starts_with("creating azurerm_vpn_gateway: timeout"));
    }
}
