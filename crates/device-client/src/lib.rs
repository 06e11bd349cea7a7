//! Load balancer device control API
//!
//! Interfaces the LBaaS reconciliation engine consumes:
//!
//! - [`DeviceClientTrait`]: the device fleet and the per-device control API
//!   (LTM objects, route domains, VLANs and tunnels, self-IPs, SNAT
//!   translations, gateway self-IPs, static routes, ARP and FDB tables).
//! - [`PortProvisioner`], [`LoadBalancerRegistry`] and [`L3Binding`]: the
//!   network control plane the agent runs next to.
//!
//! The raw transport (REST calls, authentication, TLS) lives behind these
//! traits. With the `test-util` feature an in-memory fleet
//! ([`MockDeviceClient`]) and control plane ([`MockControlPlane`]) are
//! available for tests and offline runs.
//!
//! # Example
//!
//! ```
//! # #[cfg(feature = "test-util")]
//! # async fn example() -> Result<(), device_client::DeviceError> {
//! use device_client::{DeviceClientTrait, LtmObject, MockDeviceClient, ObjectKind};
//!
//! let client = MockDeviceClient::new(&["bigip1", "bigip2"]);
//! for device in client.configured_devices() {
//!     let pool = LtmObject::new(ObjectKind::Pool, "Project_tenant", "Project_pool-1");
//!     client.create_object(&device, &pool).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod control_plane;
#[path = "trait.rs"]
pub mod device_trait;
pub mod error;
#[cfg(feature = "test-util")]
pub mod mock;
pub mod models;

pub use control_plane::{L3Binding, LoadBalancerRegistry, PortProvisioner};
pub use device_trait::DeviceClientTrait;
pub use error::DeviceError;
#[cfg(feature = "test-util")]
pub use mock::{FailureKind, JournalEntry, MockControlPlane, MockDeviceClient};
pub use models::*;
