use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::audit::AuditAction;
use crate::model::record::{indicator_or_unset, IndicatorResult};

#[derive(Deserialize, Debug)]
/// Body of a `POST` or `PUT` to the `/api` endpoint.
/// `action` selects the operation; the other fields are read by the actions that need them.
pub struct ActionRequest {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub event: Option<AuditAction>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Chemical indicator values currently shown in the edit modal, sent along with a
/// slip photo so the color suggestion can keep values it has no evidence for.
pub struct ChemicalValues {
    #[serde(default, deserialize_with = "indicator_or_unset")]
    pub chemical_external: Option<IndicatorResult>,
    #[serde(default, deserialize_with = "indicator_or_unset")]
    pub chemical_internal: Option<IndicatorResult>,
}
