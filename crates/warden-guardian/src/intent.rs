//! Pre-registered authorized intents
//!
//! A validated recovery or add-operator request registers what the account
//! owner is about to schedule. The first on-chain operation that matches
//! consumes the intent; anything after that is judged by policy again.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use warden_core::{AccountId, Address, ParticipantHash, Selector};
use warden_tracker::{DelayedOperation, OperationKind};

/// What an intent authorizes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentTarget {
    /// A config change naming this participant
    Participant(ParticipantHash),
    /// A generic call to `destination`; `None` matches any selector
    Call {
        destination: Address,
        selector: Option<Selector>,
    },
}

impl IntentTarget {
    pub fn matches(&self, op: &DelayedOperation) -> bool {
        match (self, &op.kind) {
            (IntentTarget::Participant(hash), OperationKind::ConfigChange { actions }) => {
                let wanted = hash.to_bytes();
                actions
                    .iter()
                    .any(|action| action.arg1 == wanted || action.arg2 == wanted)
            }
            (IntentTarget::Participant(_), _) => false,
            (
                IntentTarget::Call {
                    destination,
                    selector,
                },
                kind,
            ) => kind.call_target().is_some_and(|(target, op_selector)| {
                target == *destination && (selector.is_none() || *selector == op_selector)
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizedIntent {
    pub target: IntentTarget,
    /// Human-readable label shown to the account owner
    pub title: String,
}

/// One outstanding intent per account
#[derive(Debug, Default)]
pub struct IntentRegistry {
    intents: Mutex<HashMap<AccountId, AuthorizedIntent>>,
}

impl IntentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `intent`, replacing any earlier one for the account
    pub fn register(&self, account: AccountId, intent: AuthorizedIntent) {
        debug!(%account, title = %intent.title, "registered authorized intent");
        self.intents.lock().insert(account, intent);
    }

    pub fn get(&self, account: &AccountId) -> Option<AuthorizedIntent> {
        self.intents.lock().get(account).cloned()
    }

    /// Remove and return the account's intent if it matches `op`
    pub fn take_matching(
        &self,
        account: &AccountId,
        op: &DelayedOperation,
    ) -> Option<AuthorizedIntent> {
        let mut intents = self.intents.lock();
        if intents.get(account)?.target.matches(op) {
            intents.remove(account)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.intents.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
