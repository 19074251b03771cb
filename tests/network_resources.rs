use std::time::Duration;

use azurerm_network::{
    Action, ArmClient, Clients, Provider, ProviderConfig, ProviderError, ResourceError,
};
use serde_json::{Map, Value, json};
use wiremock::matchers::{any, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SUB: &str = "/subscriptions/sub/resourceGroups/rg1/providers/Microsoft.Network";

fn provider(server: &MockServer) -> Provider {
    let arm = ArmClient::with_base_url("test_token".to_string(), "sub".to_string(), server.uri())
        .unwrap()
        .with_poll_interval(Duration::from_millis(10));
    Provider::new(Clients::new(arm), ProviderConfig::default())
}

fn attrs(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn succeeded(body: Value) -> ResponseTemplate {
    let mut body = body;
    body["properties"]["provisioningState"] = json!("Succeeded");
    ResponseTemplate::new(200).set_body_json(body)
}

async fn refuse_all_requests(server: &MockServer) {
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_basic_bastion_with_standard_features_sends_no_requests() {
    let mock_server = MockServer::start().await;
    refuse_all_requests(&mock_server).await;

    let config = attrs(json!({
        "name": "bastion1",
        "resource_group_name": "rg1",
        "location": "westeurope",
        "sku": "Basic",
        "ip_configuration": [{
            "name": "configuration",
            "subnet_id": format!("{}/virtualNetworks/vnet1/subnets/AzureBastionSubnet", SUB),
            "public_ip_address_id": format!("{}/publicIPAddresses/pip1", SUB)
        }],
        "tunneling_enabled": true,
        "scale_units": 4
    }));

    let err = provider(&mock_server)
        .apply("azurerm_bastion_host", None, config)
        .await
        .unwrap_err();

    match err {
        ProviderError::Resource(ResourceError::Validation(e)) => {
            assert_eq!(e.len(), 2);
            assert!(e.errors[0].contains("`tunneling_enabled`"));
            assert!(e.errors[1].contains("`scale_units`"));
        }
        other => panic!("Expected a validation error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_route_next_hop_address_needs_virtual_appliance() {
    let mock_server = MockServer::start().await;
    refuse_all_requests(&mock_server).await;

    let config = attrs(json!({
        "name": "route1",
        "resource_group_name": "rg1",
        "route_table_name": "rt1",
        "address_prefix": "10.1.0.0/16",
        "next_hop_type": "Internet",
        "next_hop_in_ip_address": "10.0.0.4"
    }));

    let err = provider(&mock_server)
        .apply("azurerm_route", None, config)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("`next_hop_in_ip_address` is only allowed"));
}

#[tokio::test]
async fn test_create_application_security_group() {
    let mock_server = MockServer::start().await;
    let id = format!("{}/applicationSecurityGroups/asg1", SUB);
    let remote = json!({
        "id": id,
        "name": "asg1",
        "location": "westeurope",
        "tags": {"env": "test"},
        "properties": {}
    });

    Mock::given(method("GET"))
        .and(path(id.as_str()))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(id.as_str()))
        .respond_with(succeeded(remote.clone()))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PUT"))
        .and(path(id.as_str()))
        .and(body_partial_json(json!({"location": "westeurope", "tags": {"env": "test"}})))
        .respond_with(succeeded(remote))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = attrs(json!({
        "name": "asg1",
        "resource_group_name": "rg1",
        "location": "West Europe",
        "tags": {"env": "test"}
    }));

    let (action, d) = provider(&mock_server)
        .apply("azurerm_application_security_group", None, config)
        .await
        .unwrap();

    assert_eq!(action, Action::Create);
    assert_eq!(d.id(), id);
    assert_eq!(d.get_str("location"), Some("westeurope"));
}

#[tokio::test]
async fn test_create_over_existing_object_requires_import() {
    let mock_server = MockServer::start().await;
    let id = format!("{}/applicationSecurityGroups/asg1", SUB);

    Mock::given(method("GET"))
        .and(path(id.as_str()))
        .respond_with(succeeded(json!({"id": id, "location": "westeurope"})))
        .mount(&mock_server)
        .await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = attrs(json!({"name": "asg1", "resource_group_name": "rg1", "location": "westeurope"}));
    let err = provider(&mock_server)
        .apply("azurerm_application_security_group", None, config)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ProviderError::Resource(ResourceError::AlreadyExists { .. })
    ));
    assert!(err.to_string().contains("needs to be imported into the State"));
}

#[tokio::test]
async fn test_refresh_of_vanished_public_ip_clears_it() {
    let mock_server = MockServer::start().await;
    let id = format!("{}/publicIPAddresses/pip1", SUB);

    Mock::given(method("GET"))
        .and(path(id.as_str()))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let current = provider(&mock_server)
        .refresh("azurerm_public_ip", &id, attrs(json!({"name": "pip1"})))
        .await
        .unwrap();
    assert!(current.is_none());
}

#[tokio::test]
async fn test_destroy_of_missing_route_table_succeeds() {
    let mock_server = MockServer::start().await;
    let id = format!("{}/routeTables/rt1", SUB);

    Mock::given(method("DELETE"))
        .and(path(id.as_str()))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    provider(&mock_server)
        .destroy("azurerm_route_table", &id, attrs(json!({"name": "rt1"})))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_import_of_missing_object_fails() {
    let mock_server = MockServer::start().await;
    let id = format!("{}/applicationSecurityGroups/asg1", SUB);

    Mock::given(method("GET"))
        .and(path(id.as_str()))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let err = provider(&mock_server)
        .import("azurerm_application_security_group", &id)
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::ImportNotFound { .. }));
}

#[tokio::test]
async fn test_nat_gateway_public_ip_association_lifecycle() {
    let mock_server = MockServer::start().await;
    let gateway_id = format!("{}/natGateways/ng1", SUB);
    let public_ip_id = format!("{}/publicIPAddresses/pip1", SUB);
    let association_id = format!("{}|{}", gateway_id, public_ip_id);

    let bare = json!({
        "id": gateway_id,
        "location": "westeurope",
        "sku": {"name": "Standard"},
        "properties": {"idleTimeoutInMinutes": 4}
    });
    let mut associated = bare.clone();
    associated["properties"]["publicIpAddresses"] = json!([{"id": public_ip_id}]);

    Mock::given(method("GET"))
        .and(path(gateway_id.as_str()))
        .respond_with(succeeded(bare))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(gateway_id.as_str()))
        .respond_with(succeeded(associated.clone()))
        .mount(&mock_server)
        .await;

    Mock::given(method("PUT"))
        .and(path(gateway_id.as_str()))
        .and(body_partial_json(json!({
            "properties": {"publicIpAddresses": [{"id": public_ip_id}]}
        })))
        .respond_with(succeeded(associated))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = attrs(json!({
        "nat_gateway_id": gateway_id,
        "public_ip_address_id": public_ip_id
    }));

    let (action, d) = provider(&mock_server)
        .apply("azurerm_nat_gateway_public_ip_association", None, config)
        .await
        .unwrap();

    assert_eq!(action, Action::Create);
    assert_eq!(d.id(), association_id);
    assert_eq!(d.get_str("public_ip_address_id"), Some(public_ip_id.as_str()));
}

#[tokio::test]
async fn test_duplicate_nat_gateway_association_is_rejected() {
    let mock_server = MockServer::start().await;
    let gateway_id = format!("{}/natGateways/ng1", SUB);
    let public_ip_id = format!("{}/publicIPAddresses/pip1", SUB);

    Mock::given(method("GET"))
        .and(path(gateway_id.as_str()))
        .respond_with(succeeded(json!({
            "id": gateway_id,
            "location": "westeurope",
            "properties": {"publicIpAddresses": [{"id": public_ip_id.to_uppercase()}]}
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = attrs(json!({
        "nat_gateway_id": gateway_id,
        "public_ip_address_id": public_ip_id
    }));

    let err = provider(&mock_server)
        .apply("azurerm_nat_gateway_public_ip_association", None, config)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProviderError::Resource(ResourceError::AlreadyExists { .. })
    ));
}

#[tokio::test]
async fn test_changing_force_new_argument_replaces() {
    let mock_server = MockServer::start().await;
    let old_id = format!("{}/applicationSecurityGroups/asg1", SUB);
    let new_id = format!("{}/applicationSecurityGroups/asg2", SUB);

    Mock::given(method("DELETE"))
        .and(path(old_id.as_str()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(new_id.as_str()))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    let remote = json!({"id": new_id, "location": "westeurope", "properties": {}});
    Mock::given(method("GET"))
        .and(path(new_id.as_str()))
        .respond_with(succeeded(remote.clone()))
        .mount(&mock_server)
        .await;

    Mock::given(method("PUT"))
        .and(path(new_id.as_str()))
        .respond_with(succeeded(remote))
        .expect(1)
        .mount(&mock_server)
        .await;

    let prior = attrs(json!({"name": "asg1", "resource_group_name": "rg1", "location": "westeurope", "tags": {}}));
    let config = attrs(json!({"name": "asg2", "resource_group_name": "rg1", "location": "westeurope"}));

    let (action, d) = provider(&mock_server)
        .apply("azurerm_application_security_group", Some((old_id, prior)), config)
        .await
        .unwrap();

    assert_eq!(action, Action::Replace);
    assert_eq!(d.id(), new_id);
}

#[tokio::test]
async fn test_unchanged_association_is_only_read() {
    let mock_server = MockServer::start().await;
    let gateway_id = format!("{}/natGateways/ng1", SUB);
    let public_ip_id = format!("{}/publicIPAddresses/pip1", SUB);
    let association_id = format!("{}|{}", gateway_id, public_ip_id);

    Mock::given(method("GET"))
        .and(path(gateway_id.as_str()))
        .respond_with(succeeded(json!({
            "id": gateway_id,
            "location": "westeurope",
            "properties": {"publicIpAddresses": [{"id": public_ip_id}]}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = attrs(json!({
        "nat_gateway_id": gateway_id,
        "public_ip_address_id": public_ip_id
    }));
    let prior = config.clone();

    let (action, d) = provider(&mock_server)
        .apply(
            "azurerm_nat_gateway_public_ip_association",
            Some((association_id.clone(), prior)),
            config,
        )
        .await
        .unwrap();

    assert_eq!(action, Action::Unchanged);
    assert_eq!(d.id(), association_id);
}

#[tokio::test]
async fn test_removed_tags_are_not_sent_on_update() {
    let mock_server = MockServer::start().await;
    let id = format!("{}/applicationSecurityGroups/asg1", SUB);
    let remote = json!({"id": id, "name": "asg1", "location": "westeurope", "properties": {}});

    Mock::given(method("GET"))
        .and(path(id.as_str()))
        .respond_with(succeeded(remote.clone()))
        .mount(&mock_server)
        .await;

    Mock::given(method("PUT"))
        .and(path(id.as_str()))
        .respond_with(succeeded(remote))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let prior = attrs(json!({
        "name": "asg1",
        "resource_group_name": "rg1",
        "location": "westeurope",
        "tags": {"env": "old"}
    }));
    let config = attrs(json!({"name": "asg1", "resource_group_name": "rg1", "location": "westeurope"}));

    let (action, d) = provider(&mock_server)
        .apply("azurerm_application_security_group", Some((id.clone(), prior)), config)
        .await
        .unwrap();
    assert_eq!(action, Action::Update);
    assert_eq!(d.id(), id);

    let requests = mock_server.received_requests().await.unwrap();
    let put = requests
        .iter()
        .find(|r| r.method.as_str() == "PUT")
        .unwrap();
    let body: Value = serde_json::from_slice(&put.body).unwrap();
    let tags = body.get("tags").cloned().unwrap_or(Value::Null);
    assert!(tags.is_null() || tags == json!({}), "unexpected tags: {}", tags);
}
