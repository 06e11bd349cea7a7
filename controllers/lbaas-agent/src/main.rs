//! LBaaS Agent
//!
//! Reconciles one load balancer service definition onto a device fleet:
//! - attaches the networks the load balancer and its members live on
//! - creates, updates or deletes the LTM objects of the service
//! - tears down subnets nothing uses anymore
//!
//! The service definition is read from the JSON file named in
//! `SERVICE_DEFINITION`. The resulting statuses, subnet hints and listener
//! statistics are written to stdout as JSON.

mod builders;
mod config;
mod error;
mod network;
mod reconciler;
mod route_domain;
#[cfg(test)]
mod route_domain_test;
mod subnet_hints;
#[cfg(test)]
mod test_utils;

use crate::config::AgentConfig;
use crate::network::ControlPlane;
use crate::reconciler::ServiceReconciler;
use anyhow::Context;
use device_client::{MockControlPlane, MockDeviceClient, ObjectStats};
use lbaas_model::{ServiceDefinition, SubnetHints};
use serde::de::DeserializeOwned;
use std::env;
use std::fs;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_STAT_KEYS: &str = "clientside.bitsIn,clientside.bitsOut,clientside.curConns,clientside.totConns";

fn read_json<T: DeserializeOwned>(path: &str) -> anyhow::Result<T> {
    let contents = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    info!("Starting LBaaS Agent");

    // Load configuration from environment variables
    let config = AgentConfig::load()?;
    let service_path = env::var("SERVICE_DEFINITION").context("SERVICE_DEFINITION environment variable is required")?;
    let hints_path = env::var("SUBNET_HINTS").ok();
    let delete_mode = env::var("DELETE_MODE")
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false);
    let hostnames = split_list(&env::var("DEVICES").unwrap_or_else(|_| "bigip1,bigip2".to_string()));
    let stat_keys = split_list(&env::var("STAT_KEYS").unwrap_or_else(|_| DEFAULT_STAT_KEYS.to_string()));

    info!("Configuration:");
    info!("  Service definition: {}", service_path);
    info!("  Subnet hints: {}", hints_path.as_deref().unwrap_or("none"));
    info!("  Delete mode: {}", delete_mode);
    info!("  Devices: {}", hostnames.join(", "));
    info!("  Environment prefix: {}", config.environment_prefix);

    let mut service: ServiceDefinition = read_json(&service_path)?;
    let mut hints: SubnetHints = match &hints_path {
        Some(path) => read_json(path)?,
        None => SubnetHints::new(),
    };

    // In-memory fleet and control plane
    let device_names: Vec<&str> = hostnames.iter().map(String::as_str).collect();
    let device_client = MockDeviceClient::new(&device_names);
    let control_plane = MockControlPlane::new();
    for subnet in service.subnets.values() {
        control_plane.add_subnet(&subnet.id, &subnet.network_id, &subnet.cidr);
    }
    if let Some(network_id) = &service.loadbalancer.network_id {
        control_plane.add_loadbalancer(
            &service.loadbalancer.id,
            network_id,
            &service.loadbalancer.provisioning_status.to_string(),
        );
    }

    let reconciler = ServiceReconciler::new(
        Arc::new(config),
        Arc::new(device_client),
        ControlPlane::new(
            Arc::new(control_plane.clone()),
            Arc::new(control_plane.clone()),
            Some(Arc::new(control_plane)),
        ),
    );

    let outcome = reconciler.reconcile(&mut service, &mut hints, delete_mode).await;
    let mut stats: ObjectStats = stat_keys.into_iter().map(|key| (key, 0)).collect();
    match &outcome {
        Ok(()) => {
            reconciler.update_operating_status(&mut service).await?;
            reconciler.get_listener_stats(&service, &mut stats).await?;
        }
        Err(e) => error!("Reconciliation of load balancer {} failed: {}", service.loadbalancer.id, e),
    }

    let report = serde_json::json!({
        "service": service,
        "subnet_hints": hints,
        "stats": stats,
        "error": outcome.as_ref().err().map(|e| e.to_string()),
        "reconciled_at": chrono::Utc::now().to_rfc3339(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    outcome?;
    Ok(())
}
