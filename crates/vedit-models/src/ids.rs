//! Identifier newtypes.
//!
//! Every record is keyed by a string id. The newtypes keep a render id from
//! being passed where a video id is expected.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a new random ID.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Create from an existing string.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Get the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Unique identifier for a video asset.
    VideoId
);

string_id!(
    /// Unique identifier for a trim record.
    TrimId
);

string_id!(
    /// Unique identifier for a stored subtitle line.
    SubtitleId
);

string_id!(
    /// Unique identifier for a render. Doubles as the queue job name.
    RenderId
);

impl RenderId {
    /// Id of the video a render produces.
    ///
    /// Derived from the render id so a redelivered render writes the same
    /// output record instead of creating a second one.
    pub fn output_video_id(&self) -> VideoId {
        VideoId(format!("render-{}", self.0))
    }
}
