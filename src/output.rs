use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::terraform::{StateFile, StateResource};

#[derive(Tabled)]
struct StateRow<'a> {
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "ID")]
    id: &'a str,
}

impl<'a> From<&'a StateResource> for StateRow<'a> {
    fn from(resource: &'a StateResource) -> Self {
        Self {
            address: resource.address(),
            id: &resource.id,
        }
    }
}

#[derive(Tabled)]
struct ResourceTypeRow<'a> {
    #[tabled(rename = "Resource type")]
    resource_type: &'a str,
}

pub fn state_table(state: &StateFile) -> String {
    if state.resources.is_empty() {
        return "No resources in state.".to_string();
    }
    let rows: Vec<StateRow<'_>> = state.resources.iter().map(StateRow::from).collect();
    Table::new(rows).with(Style::sharp()).to_string()
}

pub fn resource_types_table<'a>(types: impl IntoIterator<Item = &'a str>) -> String {
    let rows: Vec<ResourceTypeRow<'_>> = types
        .into_iter()
        .map(|resource_type| ResourceTypeRow { resource_type })
        .collect();
    Table::new(rows).with(Style::sharp()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn test_state_table_lists_addresses() {
        let mut state = StateFile::default();
        state.upsert(StateResource {
            resource_type: "azurerm_public_ip".to_string(),
            name: "gateway".to_string(),
            id: "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.Network/publicIPAddresses/pip1"
                .to_string(),
            attributes: Map::new(),
        });

        let table = state_table(&state);
        assert!(table.contains("Address"));
        assert!(table.contains("azurerm_public_ip.gateway"));
        assert!(table.contains("publicIPAddresses/pip1"));
    }

    #[test]
    fn test_empty_state() {
        assert_eq!(state_table(&StateFile::default()), "No resources in state.");
    }

    #[test]
    fn test_resource_types_table() {
        let table = resource_types_table(["azurerm_route", "azurerm_subnet"]);
        assert!(table.contains("Resource type"));
        assert!(table.contains("azurerm_subnet"));
    }
}
