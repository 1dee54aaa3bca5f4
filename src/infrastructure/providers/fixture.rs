use anyhow::Result;

use crate::infrastructure::discovery::{ResourceDiscovery, Scope};

const FIXTURE_SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000000";
const FIXTURE_RESOURCE_GROUP: &str = "example-rg";

/// Fixed five-resource listing used by the simulated orchestrator
pub struct FixtureDiscovery {
    subscription_id: String,
}

impl FixtureDiscovery {
    pub fn new(subscription_id: Option<String>) -> Self {
        Self {
            subscription_id: subscription_id
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| FIXTURE_SUBSCRIPTION.to_string()),
        }
    }

    fn fixture_ids(&self, resource_group: &str) -> Vec<String> {
        let rg = format!(
            "/subscriptions/{}/resourceGroups/{}",
            self.subscription_id, resource_group
        );

        vec![
            format!("{}/providers/Microsoft.Network/virtualNetworks/example-network", rg),
            format!("{}/providers/Microsoft.Compute/virtualMachines/example-machine", rg),
            format!("{}/providers/Microsoft.Network/networkInterfaces/example-nic", rg),
            format!(
                "{}/providers/Microsoft.Network/virtualNetworks/example-network/subnets/internal",
                rg
            ),
            rg,
        ]
    }
}

impl ResourceDiscovery for FixtureDiscovery {
    fn list(&self, scope: &Scope) -> Result<Vec<String>> {
        match scope {
            Scope::ResourceGroup { name } => Ok(self.fixture_ids(name)),
            Scope::Query { .. } => Ok(self.fixture_ids(FIXTURE_RESOURCE_GROUP)),
            Scope::ResourceIds { ids } => Ok(ids.clone()),
        }
    }
}
