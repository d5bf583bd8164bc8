//! Context block attached to hub states and events

use serde::{Deserialize, Serialize};

/// Origin and causality of a state change, as reported by the hub
///
/// The tracker never acts on it; it is decoded so that logged states and
/// `get_states` results keep the full shape the hub sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    #[serde(default)]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}
