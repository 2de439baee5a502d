//! Deterministic addresses and participants

use warden_core::{Address, DelayLevel, Participant, Role};

/// Address whose every byte is `seed`
pub fn test_address(seed: u8) -> Address {
    Address::from_bytes([seed; 20])
}

/// Participant at `test_address(seed)` holding exactly `role`'s permissions
pub fn participant(seed: u8, role: Role, level: u8) -> Participant {
    Participant::new(test_address(seed), role, DelayLevel(level))
}
