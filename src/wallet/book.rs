//! Session-owned list of accounts with a reverse index from public key to
//! account, so inbound transfers can be matched without scanning every account.

use super::account::{Account, Keypair};
use crate::client::ClientError;
use crate::ledger::PublicKey;

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct AccountBook {
    accounts: Vec<Account>,
    by_key: HashMap<PublicKey, usize>,
}

impl AccountBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an account with zeroed state and return its index.
    pub fn add(&mut self, keypair: Keypair) -> usize {
        let index = self.accounts.len();
        // first account wins the index entry for a duplicated key
        self.by_key.entry(keypair.public.clone()).or_insert(index);
        self.accounts.push(Account::new(keypair));
        index
    }

    pub fn get(&self, index: usize) -> Result<&Account, ClientError> {
        self.accounts.get(index).ok_or(ClientError::AccountNotFound {
            index,
            count: self.accounts.len(),
        })
    }

    pub fn get_mut(&mut self, index: usize) -> Result<&mut Account, ClientError> {
        let count = self.accounts.len();
        self.accounts
            .get_mut(index)
            .ok_or(ClientError::AccountNotFound { index, count })
    }

    pub fn index_of(&self, public_key: &PublicKey) -> Option<usize> {
        self.by_key.get(public_key).copied()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
