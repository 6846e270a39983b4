use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Version tag used when an envelope carries no explicit version.
pub const DEFAULT_VERSION: i64 = -1;

/// The persisted wire shape: `{"s": <encoded state>, "v": <version>}`.
///
/// `v` is omitted entirely when the version is the default sentinel, so
/// envelopes written by unversioned configurations stay minimal and decode
/// as version `-1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub s: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub v: Option<i64>,
}

impl Envelope {
    pub fn new(state: &impl Serialize, version: i64) -> Result<Self, serde_json::Error> {
        Ok(Self {
            s: serde_json::to_value(state)?,
            v: (version != DEFAULT_VERSION).then_some(version),
        })
    }

    pub fn version(&self) -> i64 {
        self.v.unwrap_or(DEFAULT_VERSION)
    }
}
