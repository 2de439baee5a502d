//! Delayed operation model and call classification

use serde::{Deserialize, Serialize};
use tracing::warn;
use warden_core::effects::{
    BlockNumber, ChangeType, EventFamily, RawConfigAction, ScheduledCall, Timestamp,
};
use warden_core::{
    Address, OpHash, ParticipantHash, Result, Selector, TxHash, WardenError,
};

/// Length of `selector ‖ address word ‖ uint256 word`
const TOKEN_CALL_LEN: usize = 4 + 32 + 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationState {
    Pending,
    Applied,
    Cancelled,
}

/// Decoded configuration action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigAction {
    pub change: ChangeType,
    pub arg1: [u8; 32],
    pub arg2: [u8; 32],
}

impl ConfigAction {
    pub fn decode(raw: &RawConfigAction) -> Self {
        let change = ChangeType::from_code(raw.code);
        if let ChangeType::Unknown(code) = change {
            warn!(code, "unknown config change code");
        }
        Self {
            change,
            arg1: raw.arg1,
            arg2: raw.arg2,
        }
    }

    /// Participant hash carried in `arg1` for participant-targeting changes
    pub fn participant(&self) -> Option<ParticipantHash> {
        self.change
            .targets_participant()
            .then(|| ParticipantHash::from_bytes(self.arg1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    Transfer {
        destination: Address,
        value: u128,
    },
    TokenTransfer {
        token: Address,
        method: Selector,
        destination: Address,
        amount: u128,
    },
    ContractCall {
        destination: Address,
        value: u128,
        data: Vec<u8>,
    },
    ConfigChange {
        actions: Vec<ConfigAction>,
    },
}

impl OperationKind {
    /// Whether the operation moves value (native or token)
    pub fn moves_value(&self) -> bool {
        match self {
            OperationKind::Transfer { .. } | OperationKind::TokenTransfer { .. } => true,
            OperationKind::ContractCall { value, .. } => *value > 0,
            OperationKind::ConfigChange { .. } => false,
        }
    }

    /// Called contract and selector for generic operations
    pub fn call_target(&self) -> Option<(Address, Option<Selector>)> {
        match self {
            OperationKind::Transfer { destination, .. } => Some((*destination, None)),
            OperationKind::TokenTransfer { token, method, .. } => Some((*token, Some(*method))),
            OperationKind::ContractCall {
                destination, data, ..
            } => Some((*destination, Selector::of_call_data(data))),
            OperationKind::ConfigChange { .. } => None,
        }
    }
}

/// Operation derived from the event log; never stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayedOperation {
    pub op_hash: OpHash,
    pub family: EventFamily,
    pub kind: OperationKind,
    pub sender: ParticipantHash,
    pub due_time: Timestamp,
    pub state: OperationState,
    pub block: BlockNumber,
    pub tx_hash: TxHash,
}

/// Decode `selector ‖ word(address) ‖ word(uint256)` call data.
///
/// The address word must have 12 zero high bytes and the amount must fit
/// in a `u128`.
pub fn decode_token_call(data: &[u8]) -> Result<(Address, u128)> {
    if data.len() != TOKEN_CALL_LEN {
        return Err(WardenError::decode(format!(
            "token call data is {} bytes, expected {TOKEN_CALL_LEN}",
            data.len()
        )));
    }
    let mut address_word = [0u8; 32];
    address_word.copy_from_slice(&data[4..36]);
    let destination = Address::from_word(&address_word)
        .ok_or_else(|| WardenError::decode("address word has non-zero high bytes"))?;

    let amount_word = &data[36..68];
    if amount_word[..16].iter().any(|b| *b != 0) {
        return Err(WardenError::decode("token amount exceeds 128 bits"));
    }
    let mut amount = [0u8; 16];
    amount.copy_from_slice(&amount_word[16..]);
    Ok((destination, u128::from_be_bytes(amount)))
}

/// Classify a scheduled generic call.
///
/// Token calls that fail to decode degrade to `ContractCall` with a warning.
pub fn classify_call(call: &ScheduledCall, token_selectors: &[Selector]) -> OperationKind {
    if call.data.is_empty() && call.value > 0 {
        return OperationKind::Transfer {
            destination: call.target,
            value: call.value,
        };
    }

    if let Some(method) = Selector::of_call_data(&call.data) {
        if token_selectors.contains(&method) {
            match decode_token_call(&call.data) {
                Ok((destination, amount)) => {
                    return OperationKind::TokenTransfer {
                        token: call.target,
                        method,
                        destination,
                        amount,
                    };
                }
                Err(err) => {
                    warn!(
                        op_hash = %call.op_hash,
                        %method,
                        error = %err,
                        "token call failed to decode, treating as contract call"
                    );
                }
            }
        }
    }

    OperationKind::ContractCall {
        destination: call.target,
        value: call.value,
        data: call.data.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_data(selector: Selector, to: Address, amount: u128) -> Vec<u8> {
        let mut data = selector.as_bytes().to_vec();
        data.extend_from_slice(&to.to_word());
        data.extend_from_slice(&[0u8; 16]);
        data.extend_from_slice(&amount.to_be_bytes());
        data
    }

    fn call(value: u128, data: Vec<u8>) -> ScheduledCall {
        ScheduledCall {
            op_hash: OpHash::from_bytes([1u8; 32]),
            sender: ParticipantHash::from_bytes([2u8; 32]),
            target: Address::from_bytes([0xaa; 20]),
            value,
            data,
            due_time: 100,
        }
    }

    const SELECTORS: [Selector; 2] = [Selector::TOKEN_TRANSFER, Selector::TOKEN_APPROVE];

    #[test]
    fn test_plain_value_is_transfer() {
        assert_eq!(
            classify_call(&call(5, vec![]), &SELECTORS),
            OperationKind::Transfer {
                destination: Address::from_bytes([0xaa; 20]),
                value: 5
            }
        );
    }

    #[test]
    fn test_token_transfer_decoded() {
        let to = Address::from_bytes([0x11; 20]);
        let kind = classify_call(
            &call(0, token_data(Selector::TOKEN_TRANSFER, to, 1_000_000)),
            &SELECTORS,
        );
        assert_eq!(
            kind,
            OperationKind::TokenTransfer {
                token: Address::from_bytes([0xaa; 20]),
                method: Selector::TOKEN_TRANSFER,
                destination: to,
                amount: 1_000_000,
            }
        );
        assert!(kind.moves_value());
    }

    #[test]
    fn test_truncated_token_call_degrades() {
        let mut data = token_data(Selector::TOKEN_APPROVE, Address::ZERO, 1);
        data.truncate(40);
        let kind = classify_call(&call(0, data.clone()), &SELECTORS);
        assert_eq!(
            kind,
            OperationKind::ContractCall {
                destination: Address::from_bytes([0xaa; 20]),
                value: 0,
                data
            }
        );
    }

    #[test]
    fn test_dirty_address_word_rejected() {
        let mut data = token_data(Selector::TOKEN_TRANSFER, Address::ZERO, 1);
        data[5] = 1;
        assert!(decode_token_call(&data).is_err());
    }

    #[test]
    fn test_oversized_amount_rejected() {
        let mut data = token_data(Selector::TOKEN_TRANSFER, Address::ZERO, 1);
        data[36] = 0xff;
        assert!(matches!(
            decode_token_call(&data),
            Err(WardenError::Decode { .. })
        ));
    }

    #[test]
    fn test_unlisted_selector_is_contract_call() {
        let data = token_data(Selector::from_bytes([1, 2, 3, 4]), Address::ZERO, 1);
        assert!(matches!(
            classify_call(&call(0, data), &SELECTORS),
            OperationKind::ContractCall { .. }
        ));
    }

    #[test]
    fn test_unknown_change_code_preserved() {
        let action = ConfigAction::decode(&RawConfigAction {
            code: 200,
            arg1: [3u8; 32],
            arg2: [0u8; 32],
        });
        assert_eq!(action.change, ChangeType::Unknown(200));
        assert_eq!(action.participant(), None);
    }
}
