//! Resolves a `BMC` object's endpoint and credentials into a live
//! `HttpRedfishClient`. Kept as its own small crate because every
//! controller that talks to a device (C4, C6, C7) needs this wiring,
//! while `redfish-client` itself stays deliberately ignorant of
//! Kubernetes object shapes.

use std::sync::Arc;

use crds::bmc::{BmcEndpoint, BmcProtocol, BmcSpec};
use crds::bmc_secret::BmcSecretSpec;
use crds::secret::{decode_bmc_secret, SecretError};
use redfish_client::{HttpRedfishClient, RedfishClient, RedfishError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("bmc endpoint is a reference and requires an externally resolved ip")]
    UnresolvedReference,
    #[error("credential decode failed: {0}")]
    Secret(#[from] SecretError),
    #[error("client construction failed: {0}")]
    Client(#[from] RedfishError),
}

/// Builds a client for a BMC whose endpoint is inline, or whose
/// reference has already been resolved to an IP by the caller (looked
/// up from an `Endpoint` cache).
pub fn build_client(spec: &BmcSpec, secret: &BmcSecretSpec, resolved_ip: Option<&str>) -> Result<Arc<dyn RedfishClient>, ResolverError> {
    let ip = match &spec.endpoint {
        BmcEndpoint::Inline(inline) => inline.ip.as_str(),
        BmcEndpoint::Reference(_) => resolved_ip.ok_or(ResolverError::UnresolvedReference)?,
    };

    let transport = match spec.protocol {
        BmcProtocol::Redfish => redfish_client::Transport::Redfish,
        BmcProtocol::RedfishLocal => redfish_client::Transport::RedfishLocal,
    };

    let credentials = decode_bmc_secret(secret)?;
    let client = HttpRedfishClient::new(transport, ip, spec.port, credentials.username, credentials.password)?;
    Ok(Arc::new(client) as Arc<dyn RedfishClient>)
}

/// Matches `BmcEndpoint::Reference` to the name of the `Endpoint` object
/// it points at, so the caller can look it up in its own cache.
pub fn referenced_endpoint_name(spec: &BmcSpec) -> Option<&str> {
    match &spec.endpoint {
        BmcEndpoint::Reference(r) => Some(r.name.as_str()),
        BmcEndpoint::Inline(_) => None,
    }
}
