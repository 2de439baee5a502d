//! Verified account records kept by the guardian service

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use warden_core::{AccountId, Address, Result, WardenError};
use warden_verify::PhoneNumber;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,
    pub email: String,
    pub phone: PhoneNumber,
    pub verified: bool,
    pub vault: Option<Address>,
}

impl Account {
    /// Verified account keyed by `H(email)`
    pub fn verified(email: &str, phone: PhoneNumber) -> Self {
        Self {
            account_id: AccountId::for_email(email),
            email: email.to_string(),
            phone,
            verified: true,
            vault: None,
        }
    }
}

#[derive(Debug, Default)]
struct AccountCache {
    accounts: HashMap<AccountId, Account>,
    by_vault: HashMap<Address, AccountId>,
}

impl AccountCache {
    fn validate(&self) -> Result<()> {
        for (id, account) in &self.accounts {
            if *id != account.account_id {
                return Err(WardenError::internal(format!(
                    "account id mismatch: key {id} vs value {}",
                    account.account_id
                )));
            }
        }
        for (vault, id) in &self.by_vault {
            let bound = self.accounts.get(id).and_then(|a| a.vault);
            if bound != Some(*vault) {
                return Err(WardenError::internal(format!(
                    "vault index for {vault} points at {id}"
                )));
            }
        }
        Ok(())
    }
}

/// Accounts by id, with a vault → account index
#[derive(Debug, Clone, Default)]
pub struct AccountRegistry {
    state: Arc<RwLock<AccountCache>>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an account, keeping its existing vault binding
    pub async fn register(&self, mut account: Account) -> Result<Account> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.accounts.get(&account.account_id) {
            account.vault = account.vault.or(existing.vault);
        }
        if let Some(vault) = account.vault {
            state.by_vault.insert(vault, account.account_id);
        }
        state.accounts.insert(account.account_id, account.clone());
        state.validate()?;
        Ok(account)
    }

    pub async fn get(&self, account_id: &AccountId) -> Option<Account> {
        self.state.read().await.accounts.get(account_id).cloned()
    }

    pub async fn find_by_email(&self, email: &str) -> Option<Account> {
        self.get(&AccountId::for_email(email)).await
    }

    /// Attach `vault` to an account; a vault belongs to at most one account
    pub async fn bind_vault(&self, account_id: &AccountId, vault: Address) -> Result<()> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        if let Some(owner) = state.by_vault.get(&vault) {
            if owner != account_id {
                return Err(WardenError::permission_denied(format!(
                    "vault {vault} is bound to another account"
                )));
            }
        }
        let account = state
            .accounts
            .get_mut(account_id)
            .ok_or_else(|| WardenError::not_found(format!("account {account_id}")))?;
        if let Some(previous) = account.vault.replace(vault) {
            state.by_vault.remove(&previous);
        }
        state.by_vault.insert(vault, *account_id);
        state.validate()
    }

    pub async fn account_for_vault(&self, vault: &Address) -> Option<Account> {
        let state = self.state.read().await;
        let id = state.by_vault.get(vault)?;
        state.accounts.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.accounts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn phone() -> PhoneNumber {
        PhoneNumber::parse("+15555550100").unwrap()
    }

    #[tokio::test]
    async fn test_vault_binding() {
        let registry = AccountRegistry::new();
        let alice = registry
            .register(Account::verified("alice@example.com", phone()))
            .await
            .unwrap();
        let vault = Address::from_bytes([4u8; 20]);
        registry.bind_vault(&alice.account_id, vault).await.unwrap();

        assert_eq!(
            registry.account_for_vault(&vault).await.unwrap().email,
            "alice@example.com"
        );
        // Re-registering keeps the binding
        registry
            .register(Account::verified("alice@example.com", phone()))
            .await
            .unwrap();
        assert_eq!(
            registry.find_by_email("ALICE@example.com").await.unwrap().vault,
            Some(vault)
        );
    }

    #[tokio::test]
    async fn test_vault_cannot_be_shared() {
        let registry = AccountRegistry::new();
        let alice = registry
            .register(Account::verified("alice@example.com", phone()))
            .await
            .unwrap();
        let bob = registry
            .register(Account::verified("bob@example.com", phone()))
            .await
            .unwrap();
        let vault = Address::from_bytes([4u8; 20]);
        registry.bind_vault(&alice.account_id, vault).await.unwrap();
        assert_matches!(
            registry.bind_vault(&bob.account_id, vault).await,
            Err(WardenError::PermissionDenied { .. })
        );
        assert_matches!(
            registry
                .bind_vault(&AccountId::for_email("nobody@example.com"), vault)
                .await,
            Err(WardenError::PermissionDenied { .. })
        );
        assert_eq!(registry.len().await, 2);
    }
}
