//! Shared fixtures: a funded vault, a manual clock, and a configured engine.

#![allow(dead_code)]

use subs_lifecycle::{ManualClock, SignerRegistry, Subscriptions, SubscriptionsConfig, Vault};
use subs_types::{Address, Amount, Timestamp};

pub type Engine = Subscriptions<Vault, ManualClock, SignerRegistry>;

/// Epoch length used by every scenario.
pub const L: Timestamp = 100;
/// Clock reading at engine construction.
pub const T0: Timestamp = 1_000;
/// Starting balance (and approval) of each funded account.
pub const FUNDS: Amount = 1_000_000;
/// Accounts funded by [`setup`].
pub const FUNDED: [u8; 5] = [1, 2, 3, 4, 8];

pub fn addr(n: u8) -> Address {
    Address::from_low_u8(n)
}

pub fn beneficiary() -> Address {
    addr(9)
}

pub fn recurring() -> Address {
    addr(8)
}

pub fn setup() -> (Engine, ManualClock) {
    let mut vault = Vault::new();
    for n in FUNDED {
        vault.deposit(addr(n), FUNDS).expect("deposit");
        vault.approve(addr(n), FUNDS);
    }
    let clock = ManualClock::new(T0);
    let engine = Subscriptions::new(
        SubscriptionsConfig {
            epoch_length: L,
            ledger_address: addr(0xaa),
            beneficiary: beneficiary(),
            recurring_payments: recurring(),
        },
        vault,
        clock.clone(),
        SignerRegistry::new(),
    )
    .expect("engine");
    (engine, clock)
}

pub fn balance(engine: &Engine, n: u8) -> Amount {
    engine.transfer().balance_of(&addr(n))
}

/// Sum of every vault balance plus the escrow pool.
pub fn total_value(engine: &Engine) -> Amount {
    let vault = engine.transfer();
    let mut total = vault.escrowed() + vault.balance_of(&beneficiary());
    for n in FUNDED {
        total += vault.balance_of(&addr(n));
    }
    total
}

pub fn t(v: Timestamp) -> u64 {
    u64::try_from(v).expect("non-negative")
}
