//! Host-side tab records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crosstab_core::ContextRef;

/// Tab status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabStatus {
    Open,
    Closed,
}

/// Options for opening a tab.
#[derive(Debug, Clone, Default)]
pub struct TabConfig {
    pub url: String,
    /// Tab name; defaults to the generated id.
    pub name: Option<String>,
    pub window_features: Option<String>,
    /// Extra fields handed to the guest through the side-channel.
    pub extra: Map<String, Value>,
    /// The guest's side-channel is taken; carry the handoff in the URL query
    /// as well.
    pub is_window_name_overridden: bool,
}

impl TabConfig {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_features(mut self, features: impl Into<String>) -> Self {
        self.window_features = Some(features.into());
        self
    }

    #[must_use]
    pub const fn with_window_name_overridden(mut self, overridden: bool) -> Self {
        self.is_window_name_overridden = overridden;
        self
    }

    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// A spawned guest as the host tracks it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: String,
    pub name: String,
    pub url: String,
    pub reference: ContextRef,
    pub status: TabStatus,
    /// Set once the guest completed its handshake.
    pub was_successfully_loaded: bool,
    /// Creation timestamp (Unix epoch milliseconds).
    pub created_at: i64,
}

impl Tab {
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == TabStatus::Open
    }
}

/// Tab filter for queries.
#[derive(Debug, Clone, Default)]
pub struct TabFilter {
    /// Filter by status.
    pub status: Option<TabStatus>,
    /// Filter by handshake completion.
    pub loaded: Option<bool>,
    /// Limit results.
    pub limit: Option<usize>,
}

impl TabFilter {
    #[must_use]
    pub fn matches(&self, tab: &Tab) -> bool {
        self.status.is_none_or(|s| tab.status == s)
            && self.loaded.is_none_or(|l| tab.was_successfully_loaded == l)
    }
}
