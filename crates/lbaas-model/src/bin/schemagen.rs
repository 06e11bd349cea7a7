//! Prints the JSON Schema of the reconciliation boundary objects.
//!
//! Usage: `schemagen > service-definition.schema.json`

use lbaas_model::{ServiceDefinition, SubnetHints};

fn main() -> Result<(), serde_json::Error> {
    let schemas = serde_json::json!({
        "serviceDefinition": schemars::schema_for!(ServiceDefinition),
        "subnetHints": schemars::schema_for!(SubnetHints),
    });
    println!("{}", serde_json::to_string_pretty(&schemas)?);
    Ok(())
}
