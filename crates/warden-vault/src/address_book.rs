//! Contacts and the participant tuples they hold in each vault

use crate::storage::VaultStorage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;
use warden_core::{Participant, Result, VaultId, WardenError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub guid: Uuid,
    pub name: String,
    /// Participant entries this contact holds, per vault
    pub participant_tuples: BTreeMap<VaultId, Vec<Participant>>,
}

pub struct AddressBook {
    storage: Arc<dyn VaultStorage>,
}

impl AddressBook {
    pub fn new(storage: Arc<dyn VaultStorage>) -> Self {
        Self { storage }
    }

    pub async fn add_contact(&self, name: impl Into<String>) -> Result<Contact> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(WardenError::invalid("contact name must not be empty"));
        }
        let contact = Contact {
            guid: Uuid::new_v4(),
            name,
            participant_tuples: BTreeMap::new(),
        };
        self.storage.put_address_book_entry(&contact).await?;
        Ok(contact)
    }

    pub async fn contacts(&self) -> Result<Vec<Contact>> {
        self.storage.get_address_book_entries().await
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Contact>> {
        Ok(self.contacts().await?.into_iter().find(|c| c.name == name))
    }

    /// Record that `guid` holds `participant` in `vault`
    pub async fn add_participant_tuple(
        &self,
        guid: Uuid,
        vault: VaultId,
        participant: Participant,
    ) -> Result<Contact> {
        let mut contact = self
            .contacts()
            .await?
            .into_iter()
            .find(|c| c.guid == guid)
            .ok_or_else(|| WardenError::not_found(format!("contact {guid}")))?;

        let tuples = contact.participant_tuples.entry(vault).or_default();
        if !tuples.contains(&participant) {
            tuples.push(participant);
        }
        self.storage.put_address_book_entry(&contact).await?;
        Ok(contact)
    }
}
