//! Ledger/balance rules.
//!
//! The only code allowed to move an affiliate's balance: crediting approved commission
//! and debiting payout requests. Balances are conserved:
//! `balance = Σ approved commissions − Σ requested-or-paid payouts`.

pub mod balance;
pub mod payout;

pub use balance::{BalanceAudit, apply_decision, expected_balance};
pub use payout::{DEFAULT_MINIMUM_PAYOUT, Payout, PayoutPolicy, PayoutStatus, open_payout};
