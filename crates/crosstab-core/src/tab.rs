//! Guest identity and the side-channel handoff.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::ContextRef;

/// Key the handoff object is stored under in the side-channel string.
pub const HANDOFF_KEY: &str = "ACROSS_TAB_CONFIG";

/// Name assumed for a host that did not name itself.
pub const DEFAULT_PARENT_NAME: &str = "PARENT_TAB";

/// Configuration the host hands to a guest before the guest exists.
///
/// Travels as one opaque string on the side-channel and is read exactly once,
/// when the guest controller is constructed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handoff {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,
    /// Anything else the host wants the guest to see.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Handoff {
    /// Encode into the side-channel string.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut wrapper = Map::new();
        wrapper.insert(HANDOFF_KEY.to_string(), self.to_value());
        Value::Object(wrapper).to_string()
    }

    /// Decode a side-channel string.
    ///
    /// Never fails: an absent or malformed side-channel yields an empty
    /// handoff so the guest can still run standalone. A bare handoff object
    /// (without the wrapping key) is accepted too.
    #[must_use]
    pub fn decode(raw: Option<&str>) -> Self {
        raw.and_then(Self::try_decode).unwrap_or_default()
    }

    /// Append this handoff to `url` as the `ACROSS_TAB_CONFIG` query parameter.
    ///
    /// For guests whose side-channel is taken by something else.
    ///
    /// # Errors
    /// Returns error if `url` is not an absolute URL.
    pub fn append_to_url(&self, url: &str) -> Result<String, url::ParseError> {
        let mut url = Url::parse(url)?;
        url.query_pairs_mut()
            .append_pair(HANDOFF_KEY, &self.to_value().to_string());
        Ok(url.into())
    }

    /// Read a handoff from the `ACROSS_TAB_CONFIG` query parameter of `url`.
    ///
    /// `None` when the URL does not parse, carries no such parameter, or the
    /// parameter is not a handoff object.
    #[must_use]
    pub fn from_url(url: &str) -> Option<Self> {
        let url = Url::parse(url).ok()?;
        let (_, raw) = url.query_pairs().find(|(k, _)| k == HANDOFF_KEY)?;
        Self::try_decode(&raw)
    }

    /// Side-channel first, then the query parameter of `location`.
    ///
    /// Falls back to an empty handoff when neither carries one.
    #[must_use]
    pub fn locate(side_channel: Option<&str>, location: Option<&str>) -> Self {
        side_channel
            .and_then(Self::try_decode)
            .or_else(|| location.and_then(Self::from_url))
            .unwrap_or_default()
    }

    fn try_decode(raw: &str) -> Option<Self> {
        if raw.trim().is_empty() {
            return None;
        }

        let value: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!("Side-channel is not structured, ignoring: {e}");
                return None;
            }
        };

        let inner = match value {
            Value::Object(mut obj) => match obj.remove(HANDOFF_KEY) {
                Some(inner) => inner,
                None => Value::Object(obj),
            },
            _ => return None,
        };

        match serde_json::from_value(inner) {
            Ok(handoff) => Some(handoff),
            Err(e) => {
                tracing::debug!("Side-channel handoff has unexpected shape, ignoring: {e}");
                None
            }
        }
    }

    fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    /// Get an extra field by key.
    #[must_use]
    pub fn get_extra(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

/// Read-only snapshot of the guest's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub id: String,
    pub name: String,
    pub parent_name: String,
}

impl TabInfo {
    /// Derive the tab info from the handoff, falling back to the guest's own
    /// context reference for anything the host did not supply.
    #[must_use]
    pub fn resolve(handoff: &Handoff, own: &ContextRef) -> Self {
        Self {
            id: handoff.id.clone().unwrap_or_else(|| own.to_string()),
            name: handoff.name.clone().unwrap_or_else(|| own.to_string()),
            parent_name: handoff
                .parent_name
                .clone()
                .unwrap_or_else(|| DEFAULT_PARENT_NAME.to_string()),
        }
    }
}
