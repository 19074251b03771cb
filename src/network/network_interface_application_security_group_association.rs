//! `azurerm_network_interface_application_security_group_association`
//!
//! Membership of an application security group in every IP configuration of
//! a network interface. The NIC itself is managed elsewhere, so its model
//! keeps every property this module does not touch.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{SubResource, contains_id, get_existing, put_and_wait, remove_from_state, set_all};
use crate::azure::ids::{
    ApplicationSecurityGroupId, AssociationId, IdParseError, NetworkInterfaceId,
    ResourceIdentifier,
};
use crate::locks;
use crate::resource::{Clients, Resource, ResourceData, ResourceError};
use crate::schema::{Attribute, Schema};
use crate::validate;

pub const RESOURCE_TYPE: &str = "azurerm_network_interface_application_security_group_association";
pub const NETWORK_INTERFACE_RESOURCE_TYPE: &str = "azurerm_network_interface";
const API_VERSION: &str = "2023-11-01";

pub type NetworkInterfaceApplicationSecurityGroupAssociationId =
    AssociationId<NetworkInterfaceId, ApplicationSecurityGroupId>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkInterface {
    pub properties: NetworkInterfaceProperties,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkInterfaceProperties {
    pub ip_configurations: Vec<IpConfiguration>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IpConfiguration {
    pub properties: IpConfigurationProperties,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IpConfigurationProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_security_groups: Option<Vec<SubResource>>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl NetworkInterface {
    pub fn has_application_security_group(&self, id: &str) -> bool {
        self.properties
            .ip_configurations
            .iter()
            .any(|c| contains_id(c.properties.application_security_groups.as_ref(), id))
    }

    pub fn add_application_security_group(&mut self, id: &str) {
        for config in &mut self.properties.ip_configurations {
            let groups = config
                .properties
                .application_security_groups
                .get_or_insert_with(Vec::new);
            if !groups.iter().any(|g| g.id.eq_ignore_ascii_case(id)) {
                groups.push(SubResource::new(id));
            }
        }
    }

    pub fn remove_application_security_group(&mut self, id: &str) {
        for config in &mut self.properties.ip_configurations {
            if let Some(groups) = config.properties.application_security_groups.as_mut() {
                groups.retain(|g| !g.id.eq_ignore_ascii_case(id));
            }
        }
    }
}

pub struct NetworkInterfaceApplicationSecurityGroupAssociationResource;

fn flatten(id: &NetworkInterfaceApplicationSecurityGroupAssociationId) -> Map<String, Value> {
    let mut attrs = Map::new();
    attrs.insert("network_interface_id".into(), id.parent.id().into());
    attrs.insert("application_security_group_id".into(), id.child.id().into());
    attrs
}

async fn get_network_interface(
    clients: &Clients,
    id: &NetworkInterfaceId,
) -> Result<Option<NetworkInterface>, ResourceError> {
    get_existing::<NetworkInterface>(clients, &id.id(), API_VERSION)
        .await
        .map_err(|e| ResourceError::arm(format!("retrieving {}", id.describe()), e))
}

#[async_trait]
impl Resource for NetworkInterfaceApplicationSecurityGroupAssociationResource {
    fn type_name(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .attribute(
                Attribute::string("network_interface_id")
                    .required()
                    .force_new()
                    .validate_with(validate::arm_resource_id),
            )
            .attribute(
                Attribute::string("application_security_group_id")
                    .required()
                    .force_new()
                    .validate_with(validate::arm_resource_id),
            )
    }

    fn validate_import_id(&self, id: &str) -> Result<(), IdParseError> {
        NetworkInterfaceApplicationSecurityGroupAssociationId::parse(id).map(|_| ())
    }

    async fn create(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let nic_id = NetworkInterfaceId::parse(d.require_str("network_interface_id")?)?;
        let asg_id =
            ApplicationSecurityGroupId::parse(d.require_str("application_security_group_id")?)?;
        let id = NetworkInterfaceApplicationSecurityGroupAssociationId::new(
            nic_id.clone(),
            asg_id.clone(),
        );

        let _lock =
            locks::by_name(&nic_id.network_interface_name, NETWORK_INTERFACE_RESOURCE_TYPE).await;

        let mut nic = get_network_interface(clients, &nic_id)
            .await?
            .ok_or_else(|| ResourceError::Remote(format!("{} was not found", nic_id.describe())))?;

        if nic.properties.ip_configurations.is_empty() {
            return Err(ResourceError::Remote(format!(
                "{} has no IP configurations",
                nic_id.describe()
            )));
        }

        if nic.has_application_security_group(&asg_id.id()) {
            return Err(ResourceError::AlreadyExists {
                resource_type: RESOURCE_TYPE.to_string(),
                id: id.id(),
            });
        }

        nic.add_application_security_group(&asg_id.id());
        put_and_wait(clients, &nic_id.id(), API_VERSION, &nic, "updating", &nic_id.describe())
            .await?;

        d.set_id(id.id());
        self.read(clients, d).await
    }

    async fn read(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = NetworkInterfaceApplicationSecurityGroupAssociationId::parse(d.id())?;

        let Some(nic) = get_network_interface(clients, &id.parent).await? else {
            remove_from_state(d, &id.parent.describe());
            return Ok(());
        };

        if !nic.has_application_security_group(&id.child.id()) {
            remove_from_state(
                d,
                &format!("association between {} and {}", id.parent.describe(), id.child.describe()),
            );
            return Ok(());
        }

        set_all(d, flatten(&id));
        Ok(())
    }

    async fn delete(&self, clients: &Clients, d: &mut ResourceData) -> Result<(), ResourceError> {
        let id = NetworkInterfaceApplicationSecurityGroupAssociationId::parse(d.id())?;

        let _lock = locks::by_name(
            &id.parent.network_interface_name,
            NETWORK_INTERFACE_RESOURCE_TYPE,
        )
        .await;

        let Some(mut nic) = get_network_interface(clients, &id.parent).await? else {
            return Ok(());
        };

        nic.remove_application_security_group(&id.child.id());
        put_and_wait(
            clients,
            &id.parent.id(),
            API_VERSION,
            &nic,
            "removing Application Security Group association from",
            &id.parent.describe(),
        )
        .await
    }
}
