use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub const NETWORK_PROVIDER: &str = "Microsoft.Network";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdParseError {
    #[error("resource ID is empty")]
    Empty,

    #[error("parsing {id:?}: expected key/value segments but found an odd number of path elements")]
    OddSegments { id: String },

    #[error("parsing {id:?}: the segment {expected:?} was not found")]
    MissingSegment { id: String, expected: String },

    #[error("parsing {id:?}: unexpected segment {segment:?}")]
    UnexpectedSegment { id: String, segment: String },

    #[error("parsing {id:?}: expected provider {expected:?} but found {found:?}")]
    WrongProvider {
        id: String,
        expected: String,
        found: String,
    },

    #[error("parsing {id:?}: expected an ID in the format `{{parentId}}|{{childId}}`")]
    InvalidComposite { id: String },
}

/// An untyped ARM resource ID.
///
/// Keys are matched case-insensitively, values keep their original casing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    pub subscription_id: String,
    pub resource_group: Option<String>,
    pub provider: Option<String>,
    /// `(type, name)` pairs following the provider namespace.
    pub path: Vec<(String, String)>,
}

impl ResourceId {
    pub fn parse(input: &str) -> Result<Self, IdParseError> {
        let trimmed = input.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Err(IdParseError::Empty);
        }

        let components: Vec<&str> = trimmed.split('/').collect();
        if components.iter().any(|c| c.is_empty()) {
            return Err(IdParseError::OddSegments {
                id: input.to_string(),
            });
        }

        let mut iter = components.into_iter();
        let mut subscription_id = None;
        let mut resource_group = None;
        let mut provider = None;
        let mut path = Vec::new();

        while let Some(key) = iter.next() {
            let value = iter.next().ok_or_else(|| IdParseError::OddSegments {
                id: input.to_string(),
            })?;

            if provider.is_some() {
                path.push((key.to_string(), value.to_string()));
            } else if key.eq_ignore_ascii_case("subscriptions") && subscription_id.is_none() {
                subscription_id = Some(value.to_string());
            } else if key.eq_ignore_ascii_case("resourceGroups") && resource_group.is_none() {
                resource_group = Some(value.to_string());
            } else if key.eq_ignore_ascii_case("providers") {
                provider = Some(value.to_string());
            } else {
                return Err(IdParseError::UnexpectedSegment {
                    id: input.to_string(),
                    segment: key.to_string(),
                });
            }
        }

        let subscription_id = subscription_id.ok_or_else(|| IdParseError::MissingSegment {
            id: input.to_string(),
            expected: "subscriptions".to_string(),
        })?;

        Ok(Self {
            subscription_id,
            resource_group,
            provider,
            path,
        })
    }

    /// Looks up the name stored under `key` (case-insensitive).
    pub fn get(&self, key: &str) -> Option<&str> {
        self.path
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_type(&self, provider: &str, resource_type: &str) -> bool {
        self.provider
            .as_deref()
            .is_some_and(|p| p.eq_ignore_ascii_case(provider))
            && self
                .path
                .first()
                .is_some_and(|(k, _)| k.eq_ignore_ascii_case(resource_type))
    }
}

/// Behaviour shared by every typed resource ID.
pub trait ResourceIdentifier: Sized + Clone + fmt::Debug + Send + Sync + 'static {
    /// Human readable kind, e.g. `Bastion Host`.
    const KIND: &'static str;

    fn id(&self) -> String;

    fn parse(input: &str) -> Result<Self, IdParseError>;

    fn describe(&self) -> String;
}

/// Matches a parsed ID against the expected `(type, name)` keys in order.
pub(crate) fn expect_segments(
    input: &str,
    parsed: &ResourceId,
    provider: &str,
    keys: &[&str],
) -> Result<Vec<String>, IdParseError> {
    let resource_group_missing = || IdParseError::MissingSegment {
        id: input.to_string(),
        expected: "resourceGroups".to_string(),
    };
    if parsed.resource_group.is_none() {
        return Err(resource_group_missing());
    }

    match parsed.provider.as_deref() {
        Some(found) if found.eq_ignore_ascii_case(provider) => {}
        Some(found) => {
            return Err(IdParseError::WrongProvider {
                id: input.to_string(),
                expected: provider.to_string(),
                found: found.to_string(),
            });
        }
        None => {
            return Err(IdParseError::MissingSegment {
                id: input.to_string(),
                expected: "providers".to_string(),
            });
        }
    }

    let mut values = Vec::with_capacity(keys.len());
    for (i, key) in keys.iter().enumerate() {
        match parsed.path.get(i) {
            Some((k, v)) if k.eq_ignore_ascii_case(key) => values.push(v.clone()),
            Some((k, _)) => {
                return Err(IdParseError::UnexpectedSegment {
                    id: input.to_string(),
                    segment: k.clone(),
                });
            }
            None => {
                return Err(IdParseError::MissingSegment {
                    id: input.to_string(),
                    expected: (*key).to_string(),
                });
            }
        }
    }

    if let Some((extra, _)) = parsed.path.get(keys.len()) {
        return Err(IdParseError::UnexpectedSegment {
            id: input.to_string(),
            segment: extra.clone(),
        });
    }

    Ok(values)
}

macro_rules! resource_id {
    (
        $(#[$meta:meta])*
        $name:ident, kind = $kind:literal, provider = $provider:expr,
        segments = [ $( ($field:ident, $key:literal, $label:literal) ),+ $(,)? ]
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name {
            pub subscription_id: String,
            pub resource_group_name: String,
            $( pub $field: String, )+
        }

        impl $name {
            pub fn new(
                subscription_id: impl Into<String>,
                resource_group_name: impl Into<String>,
                $( $field: impl Into<String>, )+
            ) -> Self {
                Self {
                    subscription_id: subscription_id.into(),
                    resource_group_name: resource_group_name.into(),
                    $( $field: $field.into(), )+
                }
            }
        }

        impl ResourceIdentifier for $name {
            const KIND: &'static str = $kind;

            fn id(&self) -> String {
                let mut out = format!(
                    "/subscriptions/{}/resourceGroups/{}/providers/{}",
                    self.subscription_id, self.resource_group_name, $provider
                );
                $(
                    out.push_str(concat!("/", $key, "/"));
                    out.push_str(&self.$field);
                )+
                out
            }

            fn parse(input: &str) -> Result<Self, IdParseError> {
                let parsed = ResourceId::parse(input)?;
                let values = expect_segments(input, &parsed, $provider, &[$($key),+])?;
                let mut values = values.into_iter();
                let resource_group_name = parsed.resource_group.unwrap_or_default();
                Ok(Self {
                    subscription_id: parsed.subscription_id,
                    resource_group_name,
                    $( $field: values.next().unwrap_or_default(), )+
                })
            }

            fn describe(&self) -> String {
                let mut parts = vec![
                    format!("Subscription: {:?}", self.subscription_id),
                    format!("Resource Group Name: {:?}", self.resource_group_name),
                ];
                $( parts.push(format!(concat!($label, ": {:?}"), self.$field)); )+
                format!("{} ({})", $kind, parts.join(" / "))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.id())
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <Self as ResourceIdentifier>::parse(s)
            }
        }
    };
}

resource_id!(
    ApplicationSecurityGroupId, kind = "Application Security Group", provider = NETWORK_PROVIDER,
    segments = [(application_security_group_name, "applicationSecurityGroups", "Application Security Group Name")]
);

resource_id!(
    BastionHostId, kind = "Bastion Host", provider = NETWORK_PROVIDER,
    segments = [(bastion_host_name, "bastionHosts", "Bastion Host Name")]
);

resource_id!(
    NatGatewayId, kind = "Nat Gateway", provider = NETWORK_PROVIDER,
    segments = [(nat_gateway_name, "natGateways", "Nat Gateway Name")]
);

resource_id!(
    NetworkInterfaceId, kind = "Network Interface", provider = NETWORK_PROVIDER,
    segments = [(network_interface_name, "networkInterfaces", "Network Interface Name")]
);

resource_id!(
    NetworkSecurityGroupId, kind = "Network Security Group", provider = NETWORK_PROVIDER,
    segments = [(network_security_group_name, "networkSecurityGroups", "Network Security Group Name")]
);

resource_id!(
    SecurityRuleId, kind = "Security Rule", provider = NETWORK_PROVIDER,
    segments = [
        (network_security_group_name, "networkSecurityGroups", "Network Security Group Name"),
        (security_rule_name, "securityRules", "Security Rule Name"),
    ]
);

resource_id!(
    PrivateEndpointId, kind = "Private Endpoint", provider = NETWORK_PROVIDER,
    segments = [(private_endpoint_name, "privateEndpoints", "Private Endpoint Name")]
);

resource_id!(
    PublicIpAddressId, kind = "Public IP Address", provider = NETWORK_PROVIDER,
    segments = [(public_ip_address_name, "publicIPAddresses", "Public IP Address Name")]
);

resource_id!(
    RouteTableId, kind = "Route Table", provider = NETWORK_PROVIDER,
    segments = [(route_table_name, "routeTables", "Route Table Name")]
);

resource_id!(
    RouteId, kind = "Route", provider = NETWORK_PROVIDER,
    segments = [
        (route_table_name, "routeTables", "Route Table Name"),
        (route_name, "routes", "Route Name"),
    ]
);

resource_id!(
    VirtualHubId, kind = "Virtual Hub", provider = NETWORK_PROVIDER,
    segments = [(virtual_hub_name, "virtualHubs", "Virtual Hub Name")]
);

resource_id!(
    VirtualNetworkId, kind = "Virtual Network", provider = NETWORK_PROVIDER,
    segments = [(virtual_network_name, "virtualNetworks", "Virtual Network Name")]
);

resource_id!(
    SubnetId, kind = "Subnet", provider = NETWORK_PROVIDER,
    segments = [
        (virtual_network_name, "virtualNetworks", "Virtual Network Name"),
        (subnet_name, "subnets", "Subnet Name"),
    ]
);

resource_id!(
    VpnGatewayId, kind = "Vpn Gateway", provider = NETWORK_PROVIDER,
    segments = [(vpn_gateway_name, "vpnGateways", "Vpn Gateway Name")]
);

resource_id!(
    WebApplicationFirewallPolicyId, kind = "Application Gateway Web Application Firewall Policy",
    provider = NETWORK_PROVIDER,
    segments = [(policy_name, "ApplicationGatewayWebApplicationFirewallPolicies", "Application Gateway Web Application Firewall Policy Name")]
);

impl SubnetId {
    pub fn virtual_network_id(&self) -> VirtualNetworkId {
        VirtualNetworkId::new(
            self.subscription_id.clone(),
            self.resource_group_name.clone(),
            self.virtual_network_name.clone(),
        )
    }
}

impl SecurityRuleId {
    pub fn network_security_group_id(&self) -> NetworkSecurityGroupId {
        NetworkSecurityGroupId::new(
            self.subscription_id.clone(),
            self.resource_group_name.clone(),
            self.network_security_group_name.clone(),
        )
    }
}

impl RouteId {
    pub fn route_table_id(&self) -> RouteTableId {
        RouteTableId::new(
            self.subscription_id.clone(),
            self.resource_group_name.clone(),
            self.route_table_name.clone(),
        )
    }
}

/// ID of a "virtual" association resource: membership of `child` in a
/// collection owned by `parent`. There is no ARM object behind it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssociationId<P, C> {
    pub parent: P,
    pub child: C,
}

impl<P: ResourceIdentifier, C: ResourceIdentifier> AssociationId<P, C> {
    pub fn new(parent: P, child: C) -> Self {
        Self { parent, child }
    }

    pub fn id(&self) -> String {
        format!("{}|{}", self.parent.id(), self.child.id())
    }

    pub fn parse(input: &str) -> Result<Self, IdParseError> {
        let (parent, child) = input
            .split_once('|')
            .filter(|(p, c)| !p.is_empty() && !c.is_empty() && !c.contains('|'))
            .ok_or_else(|| IdParseError::InvalidComposite {
                id: input.to_string(),
            })?;

        Ok(Self {
            parent: P::parse(parent)?,
            child: C::parse(child)?,
        })
    }
}

impl<P: ResourceIdentifier, C: ResourceIdentifier> fmt::Display for AssociationId<P, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}
