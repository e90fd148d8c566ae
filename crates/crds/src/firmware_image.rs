//! Opaque firmware image descriptor — §6 "Image descriptor format".
//!
//! Parsed at the boundary from the wire JSON shape
//! `{"updatedVersion", "resourceUri", "module"}`; everything past this
//! module treats `FirmwareImage` as opaque and hands it straight to C1.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum FirmwareModule {
    Bios,
    Bmc,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FirmwareImage {
    pub updated_version: String,
    pub resource_uri: String,
    pub module: FirmwareModule,
}
