use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::infrastructure::discovery::{ResourceDiscovery, Scope};
use crate::traits::CommandExecutor;

/// Page size requested from Resource Graph
const GRAPH_PAGE_SIZE: &str = "1000";

/// Azure resource discovery through the `az` CLI.
///
/// Uses Azure Resource Graph for group and query scopes. Credentials come from
/// whatever the CLI is logged in with (`az login`, managed identity, service
/// principal environment variables).
pub struct AzCliDiscovery {
    command: Arc<dyn CommandExecutor>,
    subscription_id: Option<String>,
    working_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct GraphPage {
    #[serde(default)]
    data: Vec<GraphRow>,
    #[serde(default, alias = "$skipToken")]
    skip_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphRow {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GroupShow {
    id: String,
}

impl AzCliDiscovery {
    pub fn new(command: Arc<dyn CommandExecutor>, subscription_id: Option<String>) -> Self {
        Self {
            command,
            subscription_id: subscription_id.filter(|s| !s.is_empty()),
            working_dir: PathBuf::from("."),
        }
    }

    fn run_az(&self, args: &[&str]) -> Result<String> {
        let output = self
            .command
            .execute("az", args, &self.working_dir)
            .context("Failed to run the Azure CLI (is `az` installed?)")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "az {} failed: {}",
                args.first().copied().unwrap_or_default(),
                stderr.trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn resource_group_id(&self, name: &str) -> Result<String> {
        let mut args = vec!["group", "show", "--name", name, "-o", "json"];
        if let Some(sub) = &self.subscription_id {
            args.extend(["--subscription", sub.as_str()]);
        }

        let stdout = self.run_az(&args)?;
        let group: GroupShow = serde_json::from_str(&stdout)
            .with_context(|| format!("Failed to parse resource group '{}'", name))?;

        Ok(group.id)
    }

    /// Run a Resource Graph query, following skip tokens until exhausted
    fn graph_query(&self, query: &str) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut skip_token: Option<String> = None;

        loop {
            let mut args = vec![
                "graph",
                "query",
                "-q",
                query,
                "--first",
                GRAPH_PAGE_SIZE,
                "-o",
                "json",
            ];
            if let Some(sub) = &self.subscription_id {
                args.extend(["--subscriptions", sub.as_str()]);
            }
            if let Some(token) = &skip_token {
                args.extend(["--skip-token", token.as_str()]);
            }

            let stdout = self.run_az(&args)?;
            let page: GraphPage =
                serde_json::from_str(&stdout).context("Failed to parse Resource Graph response")?;

            let page_len = page.data.len();
            ids.extend(page.data.into_iter().map(|row| row.id));

            match page.skip_token {
                Some(token) if page_len > 0 && !token.is_empty() => skip_token = Some(token),
                _ => break,
            }
        }

        Ok(ids)
    }
}

/// Resource Graph rows come back in no fixed order; naming depends on it
const ORDER_BY_ID: &str = "| order by id asc | project id";

/// Resource Graph query listing every resource id in a group
pub fn resource_group_query(name: &str) -> String {
    format!(
        "Resources | where resourceGroup =~ '{}' {}",
        name.replace('\'', "\\'"),
        ORDER_BY_ID
    )
}

/// Resource Graph query for a caller-supplied where-clause
pub fn predicate_query(predicate: &str) -> String {
    format!("Resources | where {} {}", predicate, ORDER_BY_ID)
}

impl ResourceDiscovery for AzCliDiscovery {
    fn list(&self, scope: &Scope) -> Result<Vec<String>> {
        match scope {
            Scope::ResourceGroup { name } => {
                let mut ids = vec![self.resource_group_id(name)?];
                ids.extend(self.graph_query(&resource_group_query(name))?);
                Ok(ids)
            }
            Scope::Query { predicate } => self.graph_query(&predicate_query(predicate)),
            Scope::ResourceIds { ids } => Ok(ids.clone()),
        }
    }
}
