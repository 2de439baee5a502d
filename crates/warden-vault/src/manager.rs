//! Entry point for creating and reopening vaults

use crate::address_book::AddressBook;
use crate::builder::ConfigBuilder;
use crate::state::VaultState;
use crate::storage::{OwnedAccount, VaultStorage};
use std::sync::Arc;
use tracing::info;
use warden_core::{Address, DelayLevel, Participant, Result, Role};

/// Owns the storage handle shared by every vault, account and contact
pub struct VaultManager {
    storage: Arc<dyn VaultStorage>,
    address_book: AddressBook,
}

impl VaultManager {
    pub fn new(storage: Arc<dyn VaultStorage>) -> Self {
        Self {
            address_book: AddressBook::new(storage.clone()),
            storage,
        }
    }

    /// Start a new vault owned by `owner` at `level`.
    ///
    /// The record is persisted immediately with a single `Initialize` entry.
    pub async fn vault_config_builder(
        &self,
        owner: Address,
        level: DelayLevel,
    ) -> Result<ConfigBuilder> {
        let state = VaultState::new(Participant::new(owner, Role::Owner, level));
        let builder = ConfigBuilder::open(state, self.storage.clone())?;
        self.storage.put_vault_state(builder.state()).await?;
        info!(vault = %builder.id(), %owner, "created local vault");
        Ok(builder)
    }

    /// Reopen every stored vault, deployed or not
    pub async fn list_all_vaults(&self) -> Result<Vec<ConfigBuilder>> {
        self.storage
            .get_all_vault_states()
            .await?
            .into_iter()
            .map(|state| ConfigBuilder::open(state, self.storage.clone()))
            .collect()
    }

    pub async fn register_owned_account(
        &self,
        address: Address,
        label: impl Into<String>,
    ) -> Result<OwnedAccount> {
        let account = OwnedAccount {
            address,
            label: label.into(),
        };
        self.storage.put_owned_account(&account).await?;
        Ok(account)
    }

    pub async fn list_all_owned_accounts(&self) -> Result<Vec<OwnedAccount>> {
        self.storage.get_all_owned_accounts().await
    }

    pub fn address_book(&self) -> &AddressBook {
        &self.address_book
    }
}
