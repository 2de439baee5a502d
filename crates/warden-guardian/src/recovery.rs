//! Account creation and new-operator requests
//!
//! Every step is gated by an identity token and, where it changes who can
//! operate a vault, by a verification code sent to the account's phone. A
//! validated request becomes an [`AuthorizedIntent`] so the guardian lets the
//! matching on-chain change through exactly once.

use crate::accounts::{Account, AccountRegistry};
use crate::intent::{AuthorizedIntent, IntentRegistry, IntentTarget};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use warden_core::config::VerificationSettings;
use warden_core::effects::{
    IdentityClaims, IdentityVerifier, LedgerEffects, MessagingTransport, PhysicalTimeEffects,
    TxReceipt,
};
use warden_core::{
    AccountId, Address, DelayLevel, Participant, Result, RetryPolicy, Role, WardenConfig,
    WardenError,
};
use warden_verify::{PhoneNumber, VerificationCodeService};

/// Unverified request from a new device to join a vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorRequest {
    pub new_operator: Address,
    pub title: String,
}

/// Operator approved by a verified code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOperator {
    pub account_id: AccountId,
    pub participant: Participant,
    pub title: String,
}

pub struct RecoveryService {
    ledger: Arc<dyn LedgerEffects>,
    clock: Arc<dyn PhysicalTimeEffects>,
    transport: Arc<dyn MessagingTransport>,
    verifier: Arc<dyn IdentityVerifier>,
    codes: VerificationCodeService,
    accounts: AccountRegistry,
    intents: Arc<IntentRegistry>,
    /// Participant that submits `add_operator_now` for recovered wallets
    operator: Participant,
    new_operator_level: DelayLevel,
    message_template: String,
    retry: RetryPolicy,
    requests: Mutex<HashMap<AccountId, OperatorRequest>>,
}

impl RecoveryService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<dyn LedgerEffects>,
        clock: Arc<dyn PhysicalTimeEffects>,
        transport: Arc<dyn MessagingTransport>,
        verifier: Arc<dyn IdentityVerifier>,
        codes: VerificationCodeService,
        accounts: AccountRegistry,
        intents: Arc<IntentRegistry>,
        operator: Participant,
    ) -> Self {
        Self {
            ledger,
            clock,
            transport,
            verifier,
            codes,
            accounts,
            intents,
            operator,
            new_operator_level: DelayLevel(1),
            message_template: VerificationSettings::default().message_template,
            retry: RetryPolicy::exponential(),
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Apply the `verification` and `retry` sections
    pub fn with_config(mut self, config: &WardenConfig) -> Self {
        self.message_template = config.verification.message_template.clone();
        self.retry = config.retry.to_policy();
        self
    }

    /// Delay level given to operators added through recovery
    pub fn with_new_operator_level(mut self, level: DelayLevel) -> Self {
        self.new_operator_level = level;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn now(&self) -> Result<u64> {
        Ok(self.clock.now_secs().await?)
    }

    /// Account bound to `vault` whose email matches the token
    async fn account_for(&self, claims: &IdentityClaims, vault: &Address) -> Result<Account> {
        let account = self
            .accounts
            .account_for_vault(vault)
            .await
            .ok_or_else(|| WardenError::not_found(format!("no account for vault {vault}")))?;
        if AccountId::for_email(&claims.email) != account.account_id {
            return Err(WardenError::permission_denied(format!(
                "Invalid email. from token: {} from account: {}",
                claims.email, account.email
            )));
        }
        Ok(account)
    }

    /// Check the phone number and send it a code bound to the token's email
    pub async fn validate_phone(&self, token: &str, phone: &str) -> Result<PhoneNumber> {
        let claims = self.verifier.verify(token)?;
        let phone = PhoneNumber::parse(phone)?;
        let now = self.now().await?;
        self.codes
            .send_code(
                self.transport.as_ref(),
                &phone,
                &claims.email,
                &self.message_template,
                now,
            )
            .await?;
        Ok(phone)
    }

    /// Register a verified account once the phone's code checks out
    pub async fn create_account(&self, token: &str, code: &str, phone: &str) -> Result<Account> {
        let claims = self.verifier.verify(token)?;
        let phone = PhoneNumber::parse(phone)?;
        let now = self.now().await?;
        self.codes.verify(code, &phone, &claims.email, now)?;

        let account = self
            .accounts
            .register(Account::verified(&claims.email, phone))
            .await?;
        info!(account = %account.account_id, "created verified account");
        Ok(account)
    }

    /// Bind a deployed vault to the token's account
    pub async fn attach_vault(&self, token: &str, vault: Address) -> Result<()> {
        let claims = self.verifier.verify(token)?;
        self.accounts
            .bind_vault(&AccountId::for_email(&claims.email), vault)
            .await
    }

    /// Record a new device's request to operate `vault` and text the owner a code.
    ///
    /// The new operator's address travels in the token's `nonce` claim.
    pub async fn sign_in_as_new_operator(
        &self,
        token: &str,
        vault: &Address,
        title: &str,
    ) -> Result<()> {
        let claims = self.verifier.verify(token)?;
        let account = self.account_for(&claims, vault).await?;
        let nonce = claims
            .nonce
            .as_deref()
            .ok_or_else(|| WardenError::invalid_identity("token carries no nonce"))?;
        let new_operator: Address = nonce.parse().map_err(|_| {
            WardenError::invalid_identity(format!("nonce is not an address: {nonce}"))
        })?;

        self.requests.lock().insert(
            account.account_id,
            OperatorRequest {
                new_operator,
                title: title.to_string(),
            },
        );
        let now = self.now().await?;
        self.codes
            .send_code(
                self.transport.as_ref(),
                &account.phone,
                &account.email,
                &self.message_template,
                now,
            )
            .await?;
        info!(account = %account.account_id, %new_operator, "new operator requested");
        Ok(())
    }

    /// Verify the owner's code and authorize the pending operator request
    pub async fn validate_add_operator_now(
        &self,
        token: &str,
        vault: &Address,
        code: &str,
    ) -> Result<NewOperator> {
        let claims = self.verifier.verify(token)?;
        let account = self.account_for(&claims, vault).await?;
        let now = self.now().await?;
        self.codes
            .verify(code, &account.phone, &account.email, now)?;

        let request = self
            .requests
            .lock()
            .remove(&account.account_id)
            .ok_or_else(|| {
                WardenError::not_found(format!(
                    "no operator request for account {}",
                    account.account_id
                ))
            })?;
        let participant = Participant::new(
            request.new_operator,
            Role::Owner,
            self.new_operator_level,
        );
        self.intents.register(
            account.account_id,
            AuthorizedIntent {
                target: IntentTarget::Participant(participant.id()),
                title: request.title.clone(),
            },
        );
        info!(account = %account.account_id, operator = %request.new_operator, "operator authorized");
        Ok(NewOperator {
            account_id: account.account_id,
            participant,
            title: request.title,
        })
    }

    /// Authorize the request, then schedule `add_operator_now` on the ledger
    pub async fn validate_recover_wallet(
        &self,
        token: &str,
        vault: &Address,
        code: &str,
    ) -> Result<TxReceipt> {
        let approved = self.validate_add_operator_now(token, vault, code).await?;
        let nonce = self
            .retry
            .execute(|| async {
                self.ledger
                    .state_nonce(vault)
                    .await
                    .map_err(WardenError::from)
            })
            .await?;
        let receipt = self
            .ledger
            .add_operator_now(vault, &self.operator, &approved.participant, nonce)
            .await?;
        info!(%vault, tx = %receipt.tx_hash, operator = %approved.participant.address, "scheduled operator addition");
        Ok(receipt)
    }

    /// Pending, unverified request for `account`
    pub fn pending_request(&self, account: &AccountId) -> Option<OperatorRequest> {
        self.requests.lock().get(account).cloned()
    }
}
