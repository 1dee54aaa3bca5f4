//! Export Engine
//!
//! Discovers existing Azure resources and brings them under Terraform or
//! OpenTofu management:
//!
//! 1. `discovery` lists the scope into resource items
//! 2. `naming` assigns every item a unique configuration address
//! 3. `importer` imports the items with bounded concurrency, running the
//!    caller's hooks around each one
//! 4. `workspace` pushes the imported state to the output directory
//! 5. `artifacts` writes the configuration and the mapping and skipped reports
//!
//! `meta` sequences these steps as a state machine with a live and a
//! simulated variant; `workflow` drives a whole run.
//!
//! # Usage
//!
//! ```bash
//! # Everything in a resource group
//! tfexport resource-group my-rg --output-dir ./out
//!
//! # A Resource Graph query, four imports in flight
//! tfexport query "type =~ 'microsoft.network/virtualnetworks'" --parallelism 4
//!
//! # Re-run from an earlier mapping report
//! tfexport mapping-file ./out/tfexportResourceMapping.json --append
//! ```

pub mod artifacts;
pub mod cancel;
pub mod discovery;
pub mod error;
pub mod hcl;
pub mod hooks;
pub mod importer;
pub mod item;
pub mod live;
pub mod meta;
pub mod naming;
pub mod providers;
pub mod resource_mapper;
pub mod simulated;
pub mod state;
pub mod transient;
pub mod workflow;
pub mod workspace;

pub use cancel::CancelToken;
pub use discovery::Scope;
pub use live::LiveOrchestrator;
pub use meta::{Meta, MetaComponents, MetaOptions};
pub use simulated::SimulatedOrchestrator;
pub use workflow::{run_export, RunReport};
