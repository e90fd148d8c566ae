//! Emits the CustomResourceDefinition YAML for every kind in this crate,
//! one document per kind, concatenated to stdout. Intended for `cargo run
//! --bin crdgen > manifests/crds.yaml` ahead of `kubectl apply`.

use kube::CustomResourceExt;

fn main() {
    let crds: Vec<serde_yaml::Value> = vec![
        serde_yaml::to_value(crds::Server::crd()).unwrap(),
        serde_yaml::to_value(crds::BMC::crd()).unwrap(),
        serde_yaml::to_value(crds::BMCSecret::crd()).unwrap(),
        serde_yaml::to_value(crds::Endpoint::crd()).unwrap(),
        serde_yaml::to_value(crds::ServerClaim::crd()).unwrap(),
        serde_yaml::to_value(crds::ServerBootConfiguration::crd()).unwrap(),
        serde_yaml::to_value(crds::ServerMaintenance::crd()).unwrap(),
        serde_yaml::to_value(crds::BMCMaintenance::crd()).unwrap(),
        serde_yaml::to_value(crds::BIOSVersion::crd()).unwrap(),
        serde_yaml::to_value(crds::BMCSettings::crd()).unwrap(),
        serde_yaml::to_value(crds::BIOSSettings::crd()).unwrap(),
    ];

    for (i, crd) in crds.iter().enumerate() {
        if i > 0 {
            println!("---");
        }
        print!("{}", serde_yaml::to_string(crd).expect("serialize crd"));
    }
}
