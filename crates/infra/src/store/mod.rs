//! Referral storage: the store contract plus in-memory and Postgres implementations.

pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryReferralStore;
pub use postgres::{PostgresReferralStore, SCHEMA, connect};
pub use query::{
    AffiliateFilter, AffiliateSummary, ConversionFilter, ConversionView, DEFAULT_PAGE_LIMIT,
    MAX_PAGE_LIMIT, Page, Paged, PayoutFilter, PayoutView,
};
pub use r#trait::{ReferralStore, StoreError};
