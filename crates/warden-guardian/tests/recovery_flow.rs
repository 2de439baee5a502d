//! Account creation, new-operator requests and their interplay with the guardian

mod common;

use assert_matches::assert_matches;
use common::{code_in, Harness};
use warden_core::effects::{ChangeType, LedgerEvent};
use warden_core::{AccountId, DelayLevel, GuardianPolicy, Participant, Role, WardenError};
use warden_guardian::{AuthorizedIntent, Decision, IntentTarget};
use warden_testkit::{identity_token, test_address};

const PHONE: &str = "+1 555 555 0100";
const E164: &str = "+15555550100";
const EMAIL: &str = "owner@example.com";

/// Validate the phone, create the account and attach the harness vault
async fn onboard(h: &Harness) -> AccountId {
    let recovery = h.recovery();
    let token = identity_token(EMAIL, None);
    recovery.validate_phone(&token, PHONE).await.unwrap();
    let code = code_in(&h.transport.last_to(E164).unwrap());

    let account = recovery.create_account(&token, &code, PHONE).await.unwrap();
    assert!(account.verified);
    recovery.attach_vault(&token, h.vault).await.unwrap();
    account.account_id
}

#[tokio::test]
async fn test_create_account_requires_valid_code() {
    let h = Harness::new().await;
    let recovery = h.recovery();
    let token = identity_token(EMAIL, None);

    assert_matches!(
        recovery.validate_phone(&token, "555-0100").await,
        Err(WardenError::Invalid { message }) if message == "Invalid phone number: 555-0100"
    );
    assert_matches!(
        recovery.validate_phone("not-a-token", PHONE).await,
        Err(WardenError::InvalidIdentityProof { .. })
    );

    recovery.validate_phone(&token, PHONE).await.unwrap();
    assert_matches!(
        recovery.create_account(&token, "00000000", PHONE).await,
        Err(WardenError::InvalidVerificationCode { .. })
    );
    assert_eq!(h.accounts.len().await, 0);

    let code = code_in(&h.transport.last_to(E164).unwrap());
    // A code issued for one identity does not verify another
    assert!(recovery
        .create_account(&identity_token("intruder@example.com", None), &code, PHONE)
        .await
        .is_err());
    recovery.create_account(&token, &code, PHONE).await.unwrap();
    assert_eq!(
        h.accounts.find_by_email(EMAIL).await.unwrap().phone.as_str(),
        E164
    );
}

#[tokio::test]
async fn test_sign_in_rejects_foreign_email() {
    let h = Harness::new().await;
    onboard(&h).await;
    let recovery = h.recovery();
    let new_device = test_address(0x70);

    let err = recovery
        .sign_in_as_new_operator(
            &identity_token("someone@example.com", Some(&new_device.to_string())),
            &h.vault,
            "laptop",
        )
        .await
        .unwrap_err();
    assert_eq!(
        err,
        WardenError::PermissionDenied {
            message: "Invalid email. from token: someone@example.com from account: owner@example.com"
                .to_string()
        }
    );

    assert_matches!(
        recovery
            .sign_in_as_new_operator(&identity_token(EMAIL, None), &h.vault, "laptop")
            .await,
        Err(WardenError::InvalidIdentityProof { .. })
    );
    assert_matches!(
        recovery
            .sign_in_as_new_operator(
                &identity_token(EMAIL, Some(&new_device.to_string())),
                &test_address(0x99),
                "laptop"
            )
            .await,
        Err(WardenError::NotFound { .. })
    );
}

#[tokio::test]
async fn test_add_operator_now_registers_intent() {
    let h = Harness::new().await;
    let account = onboard(&h).await;
    let recovery = h.recovery();
    let new_device = test_address(0x70);
    let token = identity_token(EMAIL, Some(&new_device.to_string()));

    recovery
        .sign_in_as_new_operator(&token, &h.vault, "work laptop")
        .await
        .unwrap();
    let body = h.transport.last_to(E164).unwrap();
    assert!(body.starts_with("To sign-in new device as operator, enter code:"));
    assert_eq!(
        recovery.pending_request(&account).unwrap().new_operator,
        new_device
    );

    assert_matches!(
        recovery
            .validate_add_operator_now(&token, &h.vault, "12345678")
            .await,
        Err(WardenError::InvalidVerificationCode { .. })
    );
    assert!(recovery.pending_request(&account).is_some());

    let approved = recovery
        .validate_add_operator_now(&token, &h.vault, &code_in(&body))
        .await
        .unwrap();
    let expected = Participant::new(new_device, Role::Owner, DelayLevel(1));
    assert_eq!(approved.participant, expected);
    assert_eq!(approved.title, "work laptop");
    assert_eq!(
        h.intents.get(&account).unwrap().target,
        IntentTarget::Participant(expected.id())
    );

    // The request is one-shot
    assert_matches!(
        recovery
            .validate_add_operator_now(&token, &h.vault, &code_in(&body))
            .await,
        Err(WardenError::NotFound { .. })
    );
}

#[tokio::test]
async fn test_recover_wallet_is_authorized_exactly_once() {
    let h = Harness::new().await;
    let account = onboard(&h).await;
    let recovery = h.recovery();
    let guardian = h.guardian();
    let new_device = test_address(0x70);
    let token = identity_token(EMAIL, Some(&new_device.to_string()));

    recovery
        .sign_in_as_new_operator(&token, &h.vault, "phone")
        .await
        .unwrap();
    let code = code_in(&h.transport.last_to(E164).unwrap());
    h.clock.advance(5 * 60);
    let receipt = recovery
        .validate_recover_wallet(&token, &h.vault, &code)
        .await
        .unwrap();

    let operator = Participant::new(new_device, Role::Owner, DelayLevel(1));
    assert_matches!(
        &receipt.events[0].event,
        LedgerEvent::ConfigScheduled(change)
            if change.sender == h.operator.id()
                && change.actions[0].code == ChangeType::AddOperatorNow.code()
                && change.actions[0].arg1 == operator.id().to_bytes()
    );

    // First matching operation consumes the intent
    assert_eq!(
        guardian.handle_event(&receipt.events[0]).await.unwrap(),
        Some(Decision::Authorized)
    );
    assert!(h.intents.get(&account).is_none());

    // A repeat of the same change falls back to policy and is cancelled
    let repeat = h.schedule_add_operator(&h.operator, &operator).await;
    assert_eq!(
        guardian.handle_event(&repeat.events[0]).await.unwrap(),
        Some(Decision::Cancelled)
    );
    assert_eq!(h.ledger.cancel_calls(), 1);
}

/// Authorize one transfer to the harness destination, then schedule two
async fn authorized_then_repeated_transfer(policy: GuardianPolicy) -> (Harness, Decision, Decision) {
    let h = Harness::new().await;
    let account = onboard(&h).await;
    let guardian = h.guardian().with_policy(policy);
    h.intents.register(
        account,
        AuthorizedIntent {
            target: IntentTarget::Call {
                destination: test_address(9),
                selector: None,
            },
            title: "rent".to_string(),
        },
    );

    let first = h.schedule_transfer(10).await;
    let first = guardian.handle_event(&first.events[0]).await.unwrap().unwrap();
    assert!(h.intents.get(&account).is_none());

    let repeat = h.schedule_transfer(10).await;
    let repeat = guardian.handle_event(&repeat.events[0]).await.unwrap().unwrap();
    (h, first, repeat)
}

#[tokio::test]
async fn test_auto_cancel_falls_back_to_cancel_after_intent() {
    let (h, first, repeat) = authorized_then_repeated_transfer(GuardianPolicy::AutoCancel).await;
    assert_eq!(first, Decision::Authorized);
    assert_eq!(repeat, Decision::Cancelled);
    assert_eq!(h.ledger.cancel_calls(), 1);
}

#[tokio::test]
async fn test_watchdog_falls_back_to_ignore_for_calls_after_intent() {
    let (h, first, repeat) = authorized_then_repeated_transfer(GuardianPolicy::Watchdog).await;
    assert_eq!(first, Decision::Authorized);
    assert_eq!(repeat, Decision::Ignored);
    assert_eq!(h.ledger.cancel_calls(), 0);
}
