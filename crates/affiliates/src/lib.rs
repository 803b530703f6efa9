//! Affiliates domain module (referral partners).
//!
//! This crate contains business rules for affiliates: code/email validation, status
//! lifecycle and the guarded balance, implemented purely as deterministic domain logic
//! (no IO, no HTTP, no storage).

pub mod affiliate;

pub use affiliate::{Affiliate, AffiliateStatus, NewAffiliate, normalize_code};
