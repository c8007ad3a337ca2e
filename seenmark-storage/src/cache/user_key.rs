//! User-scoped keys for the persistent cache tier.
//!
//! A persistent-tier key can only be built from a [`UserId`], so one user's
//! seen map can never be read or overwritten through another user's key.

use seenmark_core::constants::PERSISTENT_KEY_PREFIX;
use seenmark_core::UserId;

/// Separator between the key prefix and the user id.
const SEPARATOR: char = ':';

/// Key under which one user's persistent seen map is stored.
///
/// # Format
///
/// `seen_items:<user_id>` as UTF-8 bytes. The prefix keeps every user's entry
/// in one contiguous LMDB range so all users can be scanned without touching
/// unrelated keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserScopedKey {
    /// Private - only constructible through `new()` or `decode()`
    user_id: UserId,
}

impl UserScopedKey {
    pub fn new(user_id: &UserId) -> Self {
        Self {
            user_id: user_id.clone(),
        }
    }

    /// Get the user this key belongs to.
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Encode the key for storage.
    pub fn encode(&self) -> Vec<u8> {
        format!("{}{}{}", PERSISTENT_KEY_PREFIX, SEPARATOR, self.user_id).into_bytes()
    }

    /// Decode a stored key.
    ///
    /// Returns `None` if the bytes are not UTF-8, lack the prefix, or name a
    /// blank user.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(bytes).ok()?;
        let rest = text.strip_prefix(PERSISTENT_KEY_PREFIX)?;
        let user = rest.strip_prefix(SEPARATOR)?;
        let user_id = UserId::new(user);
        if user_id.is_blank() {
            return None;
        }
        Some(Self { user_id })
    }

    /// Prefix shared by every user's key.
    pub fn namespace_prefix() -> Vec<u8> {
        format!("{}{}", PERSISTENT_KEY_PREFIX, SEPARATOR).into_bytes()
    }
}
