use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    TrackedResource, delete_and_wait, ensure_absent, expand_location, expand_tags, flatten_location,
    flatten_tags, get_existing, put_and_wait, remove_from_state, set_all,
};
use crate::azure::ids::{ApplicationSecurityGroupId, IdParseError, ResourceIdentifier};
use crate::resource::{Clients, Resource, ResourceData, ResourceError};
use crate::schema::{Attribute, Schema};
use crate::validate;

pub const RESOURCE_TYPE: &str = "azurerm_application_security_group";
const API_VERSION: &str = "2023-11-01";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplicationSecurityGroupProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

pub type ApplicationSecurityGroup = TrackedResource<ApplicationSecurityGroupProperties>;

pub struct ApplicationSecurityGroupResource;

fn expand(d: &ResourceData) -> Result<ApplicationSecurityGroup, ResourceError> {
    Ok(ApplicationSecurityGroup {
        location: Some(expand_location(d)?),
        tags: expand_tags(d),
        ..Default::default()
    })
}

fn flatten(id: &ApplicationSecurityGroupId, model: &ApplicationSecurityGroup) -> Map<String, Value> {
    let mut attrs = Map::new();
    attrs.insert("name".into(), id.application_security_group_name.clone().into());
    attrs.insert("resource_group_name".into(), id.resource_group_name.clone().into());
    attrs.insert("location".into(), flatten_location(model.location.as_deref()));
    attrs.insert("tags".into(), flatten_tags(model.tags.as_ref()));
    attrs
}

#[async_trait]
impl Resource for ApplicationSecurityGroupResource {
    fn type_name(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .attribute(
                Attribute::string("name")
                    .required()
                    .force_new()
                    .validate_with(validate::network_resource_name),
            )
            .attribute(
                Attribute::string("resource_group_name")
                    .required()
                    .force_new()
                    .validate_with(validate::resource_group_name),
            )
            .attribute(Attribute::string("location").required().force_new())
            .attribute(Attribute::map("tags").optional())
    }

    fn validate_import_id(&self, id: &str) -> Result<(), IdParseError> {
        ApplicationSecurityGroupId::parse(id).map(|_| ())
    }

    async fn create(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = ApplicationSecurityGroupId::new(
            clients.subscription_id(),
            d.require_str("resource_group_name")?,
            d.require_str("name")?,
        );

        ensure_absent(clients, RESOURCE_TYPE, &id.id(), &id.describe(), API_VERSION).await?;

        let model = expand(d)?;
        put_and_wait(clients, &id.id(), API_VERSION, &model, "creating", &id.describe()).await?;

        d.set_id(id.id());
        self.read(clients, d).await
    }

    async fn read(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = ApplicationSecurityGroupId::parse(d.id())?;

        let model = get_existing::<ApplicationSecurityGroup>(clients, &id.id(), API_VERSION)
            .await
            .map_err(|e| ResourceError::arm(format!("retrieving {}", id.describe()), e))?;

        match model {
            Some(model) => set_all(d, flatten(&id, &model)),
            None => remove_from_state(d, &id.describe()),
        }
        Ok(())
    }

    async fn update(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = ApplicationSecurityGroupId::parse(d.id())?;

        let model = expand(d)?;
        put_and_wait(clients, &id.id(), API_VERSION, &model, "updating", &id.describe()).await?;

        self.read(clients, d).await
    }

    async fn delete(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = ApplicationSecurityGroupId::parse(d.id())?;
        delete_and_wait(clients, &id.id(), API_VERSION, &id.describe()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expand_flatten_roundtrip() {
        let config = json!({
            "name": "asg1",
            "resource_group_name": "rg1",
            "location": "westeurope",
            "tags": {"env": "test"}
        });
        let d = ResourceData::new(config.as_object().cloned().unwrap());
        let model = expand(&d).unwrap();
        let wire: ApplicationSecurityGroup =
            serde_json::from_value(serde_json::to_value(&model).unwrap()).unwrap();

        let id = ApplicationSecurityGroupId::new("sub", "rg1", "asg1");
        assert_eq!(Value::Object(flatten(&id, &wire)), config);
    }

    #[test]
    fn test_location_is_normalized() {
        let d = ResourceData::new(
            json!({"name": "a", "resource_group_name": "rg", "location": "West Europe"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        assert_eq!(expand(&d).unwrap().location.as_deref(), Some("westeurope"));
    }
}
