//! Identifier generation
//!
//! Local session and message ids and the remote conversation id all come
//! from [`new_id`], a random 8-4-4-4-12 hex token laid out like a version 4
//! UUID. They are wrapped in distinct newtypes so a local session id can
//! never be handed to the remote service by mistake.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Generate a new random identifier
///
/// The token carries 122 random bits: the version nibble is fixed to `4`
/// and the variant nibble is one of `8`, `9`, `a` or `b`.
///
/// # Examples
///
/// ```
/// use askme::ids::new_id;
///
/// let id = new_id();
/// assert_eq!(id.len(), 36);
/// assert_eq!(&id[14..15], "4");
/// ```
pub fn new_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);

    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

// All id wrappers share one shape; only the name differs.
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh random id
            pub fn generate() -> Self {
                Self(new_id())
            }

            /// Borrow the raw id string
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self(raw)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(
    /// Local identity of a stored chat session
    SessionId
);
define_id!(
    /// Local identity of a stored or in-flight message
    MessageId
);
define_id!(
    /// Conversation identity sent to the remote chat service as `SessionID`
    RemoteConversationId
);
