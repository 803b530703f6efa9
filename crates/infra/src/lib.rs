//! Infrastructure layer: storage adapters, the referral engine and reporting.

pub mod engine;
pub mod reporting;
pub mod store;

mod integration_tests;

pub use engine::{ClickOutcome, EngineConfig, EngineError, EngineResult, ReferralEngine};
pub use reporting::{
    AffiliateSnapshot, AffiliateStats, CountAmount, OverviewSnapshot, SystemOverview,
    conversion_rate, format_rate,
};
