//! LBaaS service definition model
//!
//! Types describing the desired state handed to the reconciliation agent:
//! the load balancer, its listeners, pools, members, health monitors, L7
//! policies and rules, plus the networks and subnets they attach to.
//!
//! The aggregate root is [`ServiceDefinition`]. It is built by the caller for
//! a single reconciliation pass, mutated in place (provisioning status,
//! route-domain address annotations) and handed back.
//!
//! [`SubnetHints`] is the longer-lived, per-device bookkeeping of subnets in
//! use versus subnets that are candidates for teardown.

pub mod error;
pub mod l7;
pub mod listener;
pub mod loadbalancer;
pub mod network;
pub mod pool;
pub mod service;
pub mod status;
pub mod subnet_hint;

pub use error::*;
pub use l7::*;
pub use listener::*;
pub use loadbalancer::*;
pub use network::*;
pub use pool::*;
pub use service::*;
pub use status::*;
pub use subnet_hint::*;
