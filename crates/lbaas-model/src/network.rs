//! Networks, subnets and route-domain address notation
//!
//! Addresses placed in a tenant route domain are written `address%id`
//! (`10.0.0.5%2`). A self-IP additionally carries a prefix length
//! (`10.0.0.5%2/24`).

use crate::error::ModelError;
use ipnet::IpNet;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::str::FromStr;

/// A tenant network
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct Network {
    /// Network id
    pub id: String,

    /// Segmentation technology ("vlan", "vxlan", "gre", "flat", "opflex")
    #[serde(rename = "provider:network_type", default, skip_serializing_if = "Option::is_none")]
    pub network_type: Option<String>,

    /// VLAN id or tunnel key
    #[serde(rename = "provider:segmentation_id", default, skip_serializing_if = "Option::is_none")]
    pub segmentation_id: Option<u32>,

    /// Shared networks live in the common partition
    #[serde(default)]
    pub shared: bool,

    /// Route domain assigned by the agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_domain_id: Option<u32>,
}

impl Network {
    /// Stable `<network type>-<segmentation id>` key for this network.
    ///
    /// The same key is derived from device VLANs and tunnels, which is what
    /// lets cached route domains be matched back to networks.
    pub fn short_name(&self) -> Result<String, ModelError> {
        match (&self.network_type, self.segmentation_id) {
            (Some(net_type), Some(seg_id)) if !net_type.is_empty() && seg_id != 0 => {
                Ok(format!("{}-{}", net_type, seg_id))
            }
            _ => Err(ModelError::InvalidNetworkType {
                network_type: self.network_type.clone(),
                segmentation_id: self.segmentation_id,
            }),
        }
    }

    /// Device-side name of the VLAN or tunnel carrying this network
    pub fn l2_name(&self) -> Result<String, ModelError> {
        let short_name = self.short_name()?;
        match self.network_type.as_deref() {
            Some("vxlan") | Some("gre") => Ok(format!("tunnel-{}", short_name)),
            _ => Ok(short_name),
        }
    }
}

/// A subnet of a tenant network
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct Subnet {
    /// Subnet id
    pub id: String,

    /// Owning network
    pub network_id: String,

    /// CIDR, e.g. "10.0.0.0/24"
    pub cidr: String,

    /// Default gateway address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_ip: Option<String>,
}

impl Subnet {
    /// Parsed, truncated network of this subnet
    pub fn ip_net(&self) -> Result<IpNet, ModelError> {
        parse_cidr(&self.cidr)
    }
}

/// Parse a CIDR (host bits allowed) into its network
pub fn parse_cidr(cidr: &str) -> Result<IpNet, ModelError> {
    IpNet::from_str(cidr)
        .map(|net| net.trunc())
        .map_err(|_| ModelError::InvalidCidr(cidr.to_string()))
}

/// Two CIDRs overlap when either contains the other (equality included)
pub fn cidrs_overlap(a: &IpNet, b: &IpNet) -> bool {
    a.contains(b) || b.contains(a)
}

/// Split `10.0.0.5%2` into `("10.0.0.5", Some(2))`.
///
/// A prefix length (`/24`) after the route domain is dropped.
pub fn split_route_domain(address: &str) -> (&str, Option<u32>) {
    let address = address.split('/').next().unwrap_or(address);
    match address.split_once('%') {
        Some((addr, rd)) => (addr, rd.parse().ok()),
        None => (address, None),
    }
}

/// Address with any `%<route domain>` suffix removed
pub fn strip_route_domain(address: &str) -> &str {
    split_route_domain(address).0
}

/// Suffix an address with its route domain, leaving already annotated addresses alone
pub fn with_route_domain(address: &str, route_domain_id: u32) -> String {
    if address.contains('%') {
        address.to_string()
    } else {
        format!("{}%{}", address, route_domain_id)
    }
}

/// Parse the address part of a (possibly annotated) address
pub fn parse_address(address: &str) -> Option<IpAddr> {
    IpAddr::from_str(strip_route_domain(address)).ok()
}
