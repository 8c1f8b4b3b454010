//! ACL entries embedded in ACBs and GBs.

use serde::{Deserialize, Serialize};
use shared_types::PublicKey;

/// One entry in a block's access control list: `(public_key, read, write,
/// wrapped_key)`.
///
/// `wrapped_key` carries the block's per-block symmetric payload key,
/// wrapped for this entry's holder, present only when the block's
/// payload is encrypted and this entry holds `read`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AclEntry {
    /// The public key this entry grants rights to.
    pub public_key: PublicKey,
    /// May read the (possibly encrypted) payload.
    pub read: bool,
    /// May author a new version of the block.
    pub write: bool,
    /// The block's symmetric payload key, wrapped for `public_key`.
    /// `None` when the payload isn't encrypted, or when this entry only
    /// holds `write` (the owner token still carries the real wrap).
    pub wrapped_key: Option<Vec<u8>>,
}

impl AclEntry {
    /// A fresh entry with no rights and no key wrap.
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            public_key,
            read: false,
            write: false,
            wrapped_key: None,
        }
    }

    /// Grant read, write, or both. Matches the `permissions(key, read,
    /// write)` operation from the spec: it adds the entry if absent or
    /// edits it in place.
    pub fn with_rights(mut self, read: bool, write: bool) -> Self {
        self.read = read;
        self.write = write;
        self
    }
}

/// An access control list: owner plus zero or more delegate entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Acl {
    /// Delegate entries, in insertion order. The owner is tracked
    /// separately by the ACB/GB struct, not as an ACL entry.
    pub entries: Vec<AclEntry>,
}

impl Acl {
    /// An ACL with no delegates.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add or edit the entry for `public_key`, invalidating any cached
    /// key wrap for it (the caller must reseal to re-wrap).
    pub fn set_permissions(&mut self, public_key: PublicKey, read: bool, write: bool) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.public_key == public_key) {
            entry.read = read;
            entry.write = write;
            entry.wrapped_key = None;
        } else {
            self.entries
                .push(AclEntry::new(public_key).with_rights(read, write));
        }
    }

    /// Remove a delegate entirely (an ACL revoke).
    pub fn revoke(&mut self, public_key: &PublicKey) {
        self.entries.retain(|e| &e.public_key != public_key);
    }

    /// Whether `public_key` currently holds `write = true`.
    pub fn can_write(&self, public_key: &PublicKey) -> bool {
        self.entries
            .iter()
            .any(|e| &e.public_key == public_key && e.write)
    }

    /// The entry for `public_key`, if any.
    pub fn entry_for(&self, public_key: &PublicKey) -> Option<&AclEntry> {
        self.entries.iter().find(|e| &e.public_key == public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_permissions_adds_then_edits_in_place() {
        let mut acl = Acl::empty();
        let key = [1u8; 32];
        acl.set_permissions(key, true, false);
        assert_eq!(acl.entries.len(), 1);
        assert!(acl.entry_for(&key).unwrap().read);
        assert!(!acl.can_write(&key));

        acl.set_permissions(key, true, true);
        assert_eq!(acl.entries.len(), 1);
        assert!(acl.can_write(&key));
    }

    #[test]
    fn revoke_removes_the_entry_entirely() {
        let mut acl = Acl::empty();
        let key = [2u8; 32];
        acl.set_permissions(key, true, true);
        acl.revoke(&key);
        assert!(acl.entry_for(&key).is_none());
        assert!(!acl.can_write(&key));
    }

    #[test]
    fn editing_permissions_invalidates_cached_wrap() {
        let mut acl = Acl::empty();
        let key = [3u8; 32];
        acl.set_permissions(key, true, false);
        acl.entries[0].wrapped_key = Some(vec![1, 2, 3]);
        acl.set_permissions(key, true, true);
        assert!(acl.entry_for(&key).unwrap().wrapped_key.is_none());
    }
}
