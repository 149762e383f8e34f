use super::address::AccountAddress;
use crate::client::ClientError;
use crate::ledger::PublicKey;

use std::collections::BTreeMap;
use tracing::info;

/// Name → public key directory the anonymity set is resolved against.
#[derive(Debug, Default, Clone)]
pub struct FriendDirectory {
    friends: BTreeMap<String, PublicKey>,
}

impl FriendDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a friend.
    pub fn add_friend(&mut self, name: impl Into<String>, public_key: PublicKey) {
        let name = name.into();
        info!("Friend {} added", name);
        self.friends.insert(name, public_key);
    }

    /// Add a friend from a shared bech32m address.
    pub fn add_friend_address(
        &mut self,
        name: impl Into<String>,
        address: &str,
    ) -> Result<(), ClientError> {
        let decoded = AccountAddress::decode(address)?;
        self.add_friend(name, decoded.public_key);
        Ok(())
    }

    pub fn remove_friend(&mut self, name: &str) -> Result<PublicKey, ClientError> {
        let removed = self
            .friends
            .remove(name)
            .ok_or_else(|| ClientError::UnknownName(name.to_string()))?;
        info!("Friend {} deleted", name);
        Ok(removed)
    }

    pub fn resolve(&self, name: &str) -> Option<&PublicKey> {
        self.friends.get(name)
    }

    pub fn friends(&self) -> impl Iterator<Item = (&str, &PublicKey)> {
        self.friends.iter().map(|(name, key)| (name.as_str(), key))
    }
}
