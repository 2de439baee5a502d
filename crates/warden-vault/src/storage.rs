//! Vault storage abstraction
//!
//! Persistence mechanics are external; [`MemoryVaultStorage`] keeps
//! JSON-encoded records in memory so every read is a real decode.

use crate::address_book::Contact;
use crate::state::VaultState;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use uuid::Uuid;
use warden_core::{Address, Result, VaultId, WardenError};

/// Externally owned key pair, known here only by its address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedAccount {
    pub address: Address,
    pub label: String,
}

#[async_trait]
pub trait VaultStorage: Send + Sync {
    /// Insert or replace the record for `state.id`
    async fn put_vault_state(&self, state: &VaultState) -> Result<()>;

    async fn get_all_vault_states(&self) -> Result<Vec<VaultState>>;

    async fn put_owned_account(&self, account: &OwnedAccount) -> Result<()>;

    async fn get_all_owned_accounts(&self) -> Result<Vec<OwnedAccount>>;

    /// Insert or replace the contact with `contact.guid`
    async fn put_address_book_entry(&self, contact: &Contact) -> Result<()>;

    async fn get_address_book_entries(&self) -> Result<Vec<Contact>>;
}

/// In-memory storage holding serialized bytes
#[derive(Debug, Default)]
pub struct MemoryVaultStorage {
    vaults: RwLock<BTreeMap<VaultId, Vec<u8>>>,
    accounts: RwLock<BTreeMap<Address, Vec<u8>>>,
    contacts: RwLock<BTreeMap<Uuid, Vec<u8>>>,
}

impl MemoryVaultStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn decode_all<T: DeserializeOwned>(entries: &BTreeMap<impl Ord, Vec<u8>>) -> Result<Vec<T>> {
    entries
        .values()
        .map(|bytes| serde_json::from_slice(bytes).map_err(WardenError::from))
        .collect()
}

#[async_trait]
impl VaultStorage for MemoryVaultStorage {
    async fn put_vault_state(&self, state: &VaultState) -> Result<()> {
        let bytes = serde_json::to_vec(state)?;
        self.vaults.write().await.insert(state.id, bytes);
        Ok(())
    }

    async fn get_all_vault_states(&self) -> Result<Vec<VaultState>> {
        decode_all(&*self.vaults.read().await)
    }

    async fn put_owned_account(&self, account: &OwnedAccount) -> Result<()> {
        let bytes = serde_json::to_vec(account)?;
        self.accounts.write().await.insert(account.address, bytes);
        Ok(())
    }

    async fn get_all_owned_accounts(&self) -> Result<Vec<OwnedAccount>> {
        decode_all(&*self.accounts.read().await)
    }

    async fn put_address_book_entry(&self, contact: &Contact) -> Result<()> {
        let bytes = serde_json::to_vec(contact)?;
        self.contacts.write().await.insert(contact.guid, bytes);
        Ok(())
    }

    async fn get_address_book_entries(&self) -> Result<Vec<Contact>> {
        decode_all(&*self.contacts.read().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::LocalChange;
    use warden_core::{DelayLevel, Participant, Role, Selector};

    #[tokio::test]
    async fn test_vault_state_round_trips() {
        let storage = MemoryVaultStorage::new();
        let owner = Participant::new(Address::from_bytes([1u8; 20]), Role::Owner, DelayLevel(0));
        let mut state = VaultState::new(owner);
        state.local_changes.push(LocalChange::AddBypassMethod {
            selector: Selector::TOKEN_APPROVE,
            module: Address::from_bytes([9u8; 20]),
        });
        state.address = Some(Address::from_bytes([7u8; 20]));
        state.deployed_block = Some(12);

        storage.put_vault_state(&state).await.unwrap();
        let loaded = storage.get_all_vault_states().await.unwrap();
        assert_eq!(loaded, vec![state]);
    }

    #[tokio::test]
    async fn test_put_replaces_existing_record() {
        let storage = MemoryVaultStorage::new();
        let account = OwnedAccount {
            address: Address::from_bytes([3u8; 20]),
            label: "phone".to_string(),
        };
        storage.put_owned_account(&account).await.unwrap();
        storage
            .put_owned_account(&OwnedAccount {
                label: "laptop".to_string(),
                ..account.clone()
            })
            .await
            .unwrap();

        let accounts = storage.get_all_owned_accounts().await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].label, "laptop");
    }
}
