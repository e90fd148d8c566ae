//! Custom Resource Definitions for the bare-metal lifecycle platform.
//!
//! One module per kind (or closely related kind pair), plus the shared
//! vocabulary (`conditions`, `references`, `power`) every reconciler
//! builds on.

pub mod bios_version;
pub mod bmc;
pub mod bmc_secret;
pub mod boot_configuration;
pub mod conditions;
pub mod endpoint;
pub mod firmware_image;
pub mod mac_db;
pub mod maintenance;
pub mod power;
pub mod references;
pub mod secret;
pub mod server;
pub mod server_claim;
pub mod settings;

pub use bios_version::*;
pub use bmc::*;
pub use bmc_secret::*;
pub use boot_configuration::*;
pub use conditions::*;
pub use endpoint::*;
pub use firmware_image::*;
pub use maintenance::*;
pub use power::*;
pub use references::*;
pub use server::*;
pub use server_claim::*;
pub use settings::*;

/// Annotation that gates automatic reconciliation entirely, §6.
pub const ANNOTATION_IGNORE: &str = "reconciliation.ignore";
pub const ANNOTATION_IGNORE_VALUE: &str = "true";

/// Annotation that moves a Server from Discovery to Available, §4.4 expansion.
pub const ANNOTATION_DISCOVERY_ACK: &str = "discovery-ack";
pub const ANNOTATION_DISCOVERY_ACK_VALUE: &str = "true";

/// True if the object's annotations carry `reconciliation.ignore=true`.
pub fn is_ignored(annotations: &std::collections::BTreeMap<String, String>) -> bool {
    annotations.get(ANNOTATION_IGNORE).map(String::as_str) == Some(ANNOTATION_IGNORE_VALUE)
}
