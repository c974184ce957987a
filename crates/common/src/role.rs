//! Stream roles within a color/mask pair.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which half of the pair a stream is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamRole {
    /// The RGB stream. Acts as the sync master.
    Color,
    /// The grayscale stream whose luminance becomes output alpha.
    Mask,
}

impl StreamRole {
    /// Both roles, color first.
    pub const BOTH: [StreamRole; 2] = [StreamRole::Color, StreamRole::Mask];

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamRole::Color => "color",
            StreamRole::Mask => "mask",
        }
    }
}

impl fmt::Display for StreamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
