//! Postgres-backed referral store.
//!
//! Every unit of work runs in its own transaction. Rows that a unit of work mutates are
//! locked with `SELECT ... FOR UPDATE` before the domain rules run, so concurrent requests
//! on the same conversion, payout or affiliate balance serialize on the row lock.
//! Lock order is always conversion → affiliate.
//!
//! Reporting sums are clamped to `i64::MAX` before the `BIGINT` cast.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation on `conversions_order_product_key`) | `23505` | `Domain(DuplicateOrder)` |
//! | Database (other unique violation) | `23505` | `Domain(Conflict)` |
//! | Database (foreign key violation) | `23503` | `Domain(Conflict)` |
//! | Database (check constraint violation) | `23514` | `Domain(Validation)` |
//! | Database (other) | Any other | `Backend` |
//! | PoolTimedOut / PoolClosed | N/A | `Unavailable` |
//! | Other | N/A | `Backend` |

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use reftrack_affiliates::{Affiliate, AffiliateStatus};
use reftrack_attribution::Click;
use reftrack_conversions::{Conversion, ConversionStatus, Decision, OrderId};
use reftrack_core::{
    AffiliateId, ConversionId, DomainError, PayoutId, ProductId, Tenant, TenantId,
};
use reftrack_ledger::{Payout, PayoutPolicy, PayoutStatus, apply_decision, open_payout};
use reftrack_products::{CommissionRule, Product};

use super::query::{
    AffiliateFilter, AffiliateSummary, ConversionFilter, ConversionView, Page, Paged,
    PayoutFilter, PayoutView,
};
use super::r#trait::{ReferralStore, StoreError};
use crate::reporting::{AffiliateSnapshot, CountAmount, OverviewSnapshot};

const ORDER_PRODUCT_CONSTRAINT: &str = "conversions_order_product_key";

/// Idempotent schema DDL applied by [`ReferralStore::ensure_schema`].
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tenants (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS products (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL REFERENCES tenants (id),
    name TEXT NOT NULL,
    slug TEXT NOT NULL CONSTRAINT products_slug_key UNIQUE,
    domain TEXT NOT NULL,
    api_key TEXT NOT NULL CONSTRAINT products_api_key_key UNIQUE,
    commission_type TEXT NOT NULL CHECK (commission_type IN ('percentage', 'fixed')),
    commission_value NUMERIC NOT NULL CHECK (commission_value >= 0),
    cookie_duration_days INTEGER NOT NULL CHECK (cookie_duration_days BETWEEN 1 AND 365),
    active BOOLEAN NOT NULL DEFAULT TRUE,
    created_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS affiliates (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL REFERENCES tenants (id),
    code TEXT NOT NULL CONSTRAINT affiliates_code_key UNIQUE,
    email TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('active', 'suspended')),
    balance BIGINT NOT NULL DEFAULT 0 CHECK (balance >= 0),
    created_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS clicks (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL REFERENCES tenants (id),
    product_id UUID NOT NULL REFERENCES products (id),
    affiliate_id UUID NOT NULL REFERENCES affiliates (id),
    ip TEXT NOT NULL,
    user_agent TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS conversions (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL REFERENCES tenants (id),
    product_id UUID NOT NULL REFERENCES products (id),
    affiliate_id UUID NOT NULL REFERENCES affiliates (id),
    order_id TEXT NOT NULL,
    order_amount BIGINT NOT NULL CHECK (order_amount >= 0),
    commission_amount BIGINT NOT NULL CHECK (commission_amount >= 0),
    status TEXT NOT NULL CHECK (status IN ('pending', 'approved', 'rejected')),
    created_at TIMESTAMPTZ NOT NULL,
    decided_at TIMESTAMPTZ,
    CONSTRAINT conversions_order_product_key UNIQUE (order_id, product_id)
);

CREATE TABLE IF NOT EXISTS payouts (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL REFERENCES tenants (id),
    affiliate_id UUID NOT NULL REFERENCES affiliates (id),
    amount BIGINT NOT NULL CHECK (amount > 0),
    status TEXT NOT NULL CHECK (status IN ('requested', 'paid')),
    requested_at TIMESTAMPTZ NOT NULL,
    processed_at TIMESTAMPTZ
);

CREATE INDEX IF NOT EXISTS clicks_affiliate_idx ON clicks (affiliate_id);
CREATE INDEX IF NOT EXISTS conversions_affiliate_idx ON conversions (affiliate_id, created_at DESC);
CREATE INDEX IF NOT EXISTS conversions_status_idx ON conversions (status, created_at DESC);
CREATE INDEX IF NOT EXISTS payouts_affiliate_idx ON payouts (affiliate_id, requested_at DESC);
"#;

const PRODUCT_COLUMNS: &str = "id, tenant_id, name, slug, domain, api_key, commission_type, \
     commission_value, cookie_duration_days, active, created_at";
const AFFILIATE_COLUMNS: &str = "id, tenant_id, code, email, status, balance, created_at";
const CONVERSION_COLUMNS: &str = "id, tenant_id, product_id, affiliate_id, order_id, \
     order_amount, commission_amount, status, created_at, decided_at";
const PAYOUT_COLUMNS: &str =
    "id, tenant_id, affiliate_id, amount, status, requested_at, processed_at";

/// Open a connection pool.
pub async fn connect(
    database_url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await
        .map_err(|e| map_sqlx_error("connect", e))
}

/// Postgres-backed referral store.
///
/// `Send + Sync`; clones share the same pool.
#[derive(Debug, Clone)]
pub struct PostgresReferralStore {
    pool: Arc<PgPool>,
}

impl PostgresReferralStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    async fn begin(&self, operation: &str) -> Result<Transaction<'static, Postgres>, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(operation, e))
    }

    /// Read-only transaction over one consistent snapshot.
    async fn begin_snapshot(
        &self,
        operation: &str,
    ) -> Result<Transaction<'static, Postgres>, StoreError> {
        let mut tx = self.begin(operation).await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        Ok(tx)
    }

    async fn fetch_optional<T>(
        &self,
        operation: &str,
        query: PgQuery<'_>,
        decode_row: fn(&PgRow) -> Result<T, StoreError>,
    ) -> Result<Option<T>, StoreError> {
        let row = query
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        row.as_ref().map(decode_row).transpose()
    }
}

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>;

#[async_trait::async_trait]
impl ReferralStore for PostgresReferralStore {
    #[instrument(skip(self), err)]
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ping", e))?;
        Ok(())
    }

    // -- tenants --

    #[instrument(skip(self, tenant), fields(tenant_id = %tenant.id), err)]
    async fn insert_tenant(&self, tenant: &Tenant) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO tenants (id, name, created_at) VALUES ($1, $2, $3)")
            .bind(tenant.id.as_uuid())
            .bind(&tenant.name)
            .bind(tenant.created_at)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_tenant", e))?;
        Ok(())
    }

    #[instrument(skip(self, tenant), fields(tenant_id = %tenant.id), err)]
    async fn update_tenant(&self, tenant: &Tenant) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE tenants SET name = $2 WHERE id = $1")
            .bind(tenant.id.as_uuid())
            .bind(&tenant.name)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_tenant", e))?;
        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("tenant", tenant.id).into());
        }
        Ok(())
    }

    async fn get_tenant(&self, id: TenantId) -> Result<Option<Tenant>, StoreError> {
        self.fetch_optional(
            "get_tenant",
            sqlx::query("SELECT id, name, created_at FROM tenants WHERE id = $1")
                .bind(id.as_uuid()),
            decode_into::<TenantRow, Tenant>,
        )
        .await
    }

    async fn first_tenant(&self) -> Result<Option<Tenant>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, created_at FROM tenants ORDER BY created_at ASC, id ASC LIMIT 1",
        )
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("first_tenant", e))?;
        row.as_ref().map(decode_into::<TenantRow, Tenant>).transpose()
    }

    async fn list_tenants(&self, page: Page) -> Result<Paged<Tenant>, StoreError> {
        let mut tx = self.begin_snapshot("list_tenants").await?;
        let total = count(
            &mut tx,
            "list_tenants",
            sqlx::query("SELECT COUNT(*) AS total FROM tenants"),
        )
        .await?;
        let rows = sqlx::query(
            r#"
            SELECT id, name, created_at
            FROM tenants
            ORDER BY created_at DESC, id DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(i64::from(page.limit))
        .bind(offset(page))
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("list_tenants", e))?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("list_tenants", e))?;

        let items = decode_all::<TenantRow, Tenant>(&rows)?;
        Ok(Paged::new(items, total, page))
    }

    // -- products --

    #[instrument(
        skip(self, product),
        fields(product_id = %product.id, slug = %product.slug),
        err
    )]
    async fn insert_product(&self, product: &Product) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO products ({PRODUCT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        ))
        .bind(product.id.as_uuid())
        .bind(product.tenant_id.as_uuid())
        .bind(&product.name)
        .bind(&product.slug)
        .bind(&product.domain)
        .bind(&product.api_key)
        .bind(product.commission.kind())
        .bind(product.commission.value())
        .bind(cookie_days_to_db(product.cookie_duration_days)?)
        .bind(product.active)
        .bind(product.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;
        Ok(())
    }

    #[instrument(skip(self, product), fields(product_id = %product.id), err)]
    async fn update_product(&self, product: &Product) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET name = $2,
                slug = $3,
                domain = $4,
                commission_type = $5,
                commission_value = $6,
                cookie_duration_days = $7,
                active = $8
            WHERE id = $1
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.slug)
        .bind(&product.domain)
        .bind(product.commission.kind())
        .bind(product.commission.value())
        .bind(cookie_days_to_db(product.cookie_duration_days)?)
        .bind(product.active)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_product", e))?;
        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("product", product.id).into());
        }
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        self.fetch_optional(
            "get_product",
            sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
                .bind(id.as_uuid()),
            decode_into::<ProductRow, Product>,
        )
        .await
    }

    async fn product_by_slug(&self, slug: &str) -> Result<Option<Product>, StoreError> {
        self.fetch_optional(
            "product_by_slug",
            sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE slug = $1"))
                .bind(slug),
            decode_into::<ProductRow, Product>,
        )
        .await
    }

    async fn product_by_api_key(&self, api_key: &str) -> Result<Option<Product>, StoreError> {
        self.fetch_optional(
            "product_by_api_key",
            sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE api_key = $1"))
                .bind(api_key),
            decode_into::<ProductRow, Product>,
        )
        .await
    }

    async fn list_products(
        &self,
        tenant_id: Option<TenantId>,
        page: Page,
    ) -> Result<Paged<Product>, StoreError> {
        let tenant = tenant_id.map(|t| *t.as_uuid());
        let mut tx = self.begin_snapshot("list_products").await?;
        let total = count(
            &mut tx,
            "list_products",
            sqlx::query(
                "SELECT COUNT(*) AS total FROM products WHERE ($1::uuid IS NULL OR tenant_id = $1)",
            )
            .bind(tenant),
        )
        .await?;
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE ($1::uuid IS NULL OR tenant_id = $1) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(tenant)
        .bind(i64::from(page.limit))
        .bind(offset(page))
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("list_products", e))?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("list_products", e))?;

        let items = decode_all::<ProductRow, Product>(&rows)?;
        Ok(Paged::new(items, total, page))
    }

    // -- affiliates --

    #[instrument(
        skip(self, affiliate),
        fields(affiliate_id = %affiliate.id, code = %affiliate.code),
        err
    )]
    async fn insert_affiliate(&self, affiliate: &Affiliate) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO affiliates ({AFFILIATE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
        ))
        .bind(affiliate.id.as_uuid())
        .bind(affiliate.tenant_id.as_uuid())
        .bind(&affiliate.code)
        .bind(&affiliate.email)
        .bind(affiliate.status.as_str())
        .bind(affiliate.balance())
        .bind(affiliate.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_affiliate", e))?;
        Ok(())
    }

    async fn get_affiliate(&self, id: AffiliateId) -> Result<Option<Affiliate>, StoreError> {
        self.fetch_optional(
            "get_affiliate",
            sqlx::query(&format!("SELECT {AFFILIATE_COLUMNS} FROM affiliates WHERE id = $1"))
                .bind(id.as_uuid()),
            decode_into::<AffiliateRow, Affiliate>,
        )
        .await
    }

    async fn affiliate_by_code(&self, code: &str) -> Result<Option<Affiliate>, StoreError> {
        self.fetch_optional(
            "affiliate_by_code",
            sqlx::query(&format!("SELECT {AFFILIATE_COLUMNS} FROM affiliates WHERE code = $1"))
                .bind(code),
            decode_into::<AffiliateRow, Affiliate>,
        )
        .await
    }

    #[instrument(skip(self), err)]
    async fn set_affiliate_status(
        &self,
        id: AffiliateId,
        status: AffiliateStatus,
    ) -> Result<Affiliate, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE affiliates SET status = $2 WHERE id = $1 RETURNING {AFFILIATE_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(status.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("set_affiliate_status", e))?;
        match row {
            Some(row) => decode_into::<AffiliateRow, Affiliate>(&row),
            None => Err(DomainError::not_found("affiliate", id).into()),
        }
    }

    async fn list_affiliates(
        &self,
        filter: &AffiliateFilter,
        page: Page,
    ) -> Result<Paged<AffiliateSummary>, StoreError> {
        let tenant = filter.tenant_id.map(|t| *t.as_uuid());
        let pattern = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(like_pattern);

        let mut tx = self.begin_snapshot("list_affiliates").await?;
        let total = count(
            &mut tx,
            "list_affiliates",
            sqlx::query(
                r#"
                SELECT COUNT(*) AS total
                FROM affiliates a
                WHERE ($1::uuid IS NULL OR a.tenant_id = $1)
                    AND ($2::text IS NULL OR a.code ILIKE $2 ESCAPE '\' OR a.email ILIKE $2 ESCAPE '\')
                "#,
            )
            .bind(tenant)
            .bind(pattern.as_deref()),
        )
        .await?;
        let rows = sqlx::query(
            r#"
            SELECT
                a.id, a.tenant_id, a.code, a.email, a.status, a.balance, a.created_at,
                (SELECT COUNT(*) FROM clicks c WHERE c.affiliate_id = a.id) AS click_count,
                (SELECT COUNT(*) FROM conversions v WHERE v.affiliate_id = a.id) AS conversion_count,
                (SELECT LEAST(COALESCE(SUM(v.commission_amount), 0), 9223372036854775807)::BIGINT
                    FROM conversions v WHERE v.affiliate_id = a.id) AS total_commission,
                (SELECT LEAST(COALESCE(SUM(v.commission_amount), 0), 9223372036854775807)::BIGINT
                    FROM conversions v WHERE v.affiliate_id = a.id AND v.status = 'approved') AS approved_commission
            FROM affiliates a
            WHERE ($1::uuid IS NULL OR a.tenant_id = $1)
                AND ($2::text IS NULL OR a.code ILIKE $2 ESCAPE '\' OR a.email ILIKE $2 ESCAPE '\')
            ORDER BY a.created_at DESC, a.id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(tenant)
        .bind(pattern.as_deref())
        .bind(i64::from(page.limit))
        .bind(offset(page))
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("list_affiliates", e))?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("list_affiliates", e))?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            let affiliate = decode_into::<AffiliateRow, Affiliate>(row)?;
            items.push(AffiliateSummary {
                affiliate,
                clicks: get_count(row, "click_count")?,
                conversions: get_count(row, "conversion_count")?,
                total_commission: get_column(row, "total_commission")?,
                approved_commission: get_column(row, "approved_commission")?,
            });
        }
        Ok(Paged::new(items, total, page))
    }

    // -- clicks --

    #[instrument(
        skip(self, click),
        fields(click_id = %click.id, affiliate_id = %click.affiliate_id),
        err
    )]
    async fn insert_click(&self, click: &Click) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO clicks (id, tenant_id, product_id, affiliate_id, ip, user_agent, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(click.id.as_uuid())
        .bind(click.tenant_id.as_uuid())
        .bind(click.product_id.as_uuid())
        .bind(click.affiliate_id.as_uuid())
        .bind(&click.metadata.ip)
        .bind(&click.metadata.user_agent)
        .bind(click.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_click", e))?;
        Ok(())
    }

    // -- conversions --

    #[instrument(
        skip(self, conversion),
        fields(
            conversion_id = %conversion.id,
            product_id = %conversion.product_id,
            order_id = %conversion.order_id
        ),
        err
    )]
    async fn insert_conversion(&self, conversion: &Conversion) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO conversions ({CONVERSION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(conversion.id.as_uuid())
        .bind(conversion.tenant_id.as_uuid())
        .bind(conversion.product_id.as_uuid())
        .bind(conversion.affiliate_id.as_uuid())
        .bind(conversion.order_id.as_str())
        .bind(conversion.order_amount)
        .bind(conversion.commission_amount)
        .bind(conversion.status.as_str())
        .bind(conversion.created_at)
        .bind(conversion.decided_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, Some(ORDER_PRODUCT_CONSTRAINT)) {
                StoreError::Domain(DomainError::DuplicateOrder {
                    order_id: conversion.order_id.to_string(),
                    product_id: conversion.product_id,
                })
            } else {
                map_sqlx_error("insert_conversion", e)
            }
        })?;
        Ok(())
    }

    async fn get_conversion(&self, id: ConversionId) -> Result<Option<Conversion>, StoreError> {
        self.fetch_optional(
            "get_conversion",
            sqlx::query(&format!("SELECT {CONVERSION_COLUMNS} FROM conversions WHERE id = $1"))
                .bind(id.as_uuid()),
            decode_into::<ConversionRow, Conversion>,
        )
        .await
    }

    async fn conversion_by_order(
        &self,
        product_id: ProductId,
        order_id: &OrderId,
    ) -> Result<Option<Conversion>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {CONVERSION_COLUMNS} FROM conversions WHERE product_id = $1 AND order_id = $2"
        ))
        .bind(product_id.as_uuid())
        .bind(order_id.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("conversion_by_order", e))?;
        row.as_ref().map(decode_into::<ConversionRow, Conversion>).transpose()
    }

    #[instrument(skip(self), fields(credited = tracing::field::Empty), err)]
    async fn decide_conversion(
        &self,
        id: ConversionId,
        decision: Decision,
        now: DateTime<Utc>,
    ) -> Result<Conversion, StoreError> {
        let span = Span::current();
        let mut tx = self.begin("decide_conversion").await?;

        let row = sqlx::query(&format!(
            "SELECT {CONVERSION_COLUMNS} FROM conversions WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("decide_conversion", e))?;
        let mut conversion: Conversion = match row {
            Some(row) => decode_into::<ConversionRow, Conversion>(&row)?,
            None => return Err(DomainError::not_found("conversion", id).into()),
        };

        let mut affiliate = lock_affiliate(&mut tx, conversion.affiliate_id)
            .await?
            .ok_or_else(|| {
                StoreError::Corrupt(format!(
                    "dangling affiliate reference {}",
                    conversion.affiliate_id
                ))
            })?;

        // Dropping `tx` on error rolls back and releases both row locks.
        let credited = apply_decision(&mut conversion, &mut affiliate, decision, now)?;

        sqlx::query("UPDATE conversions SET status = $2, decided_at = $3 WHERE id = $1")
            .bind(conversion.id.as_uuid())
            .bind(conversion.status.as_str())
            .bind(conversion.decided_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("decide_conversion", e))?;

        if let Some(amount) = credited {
            sqlx::query("UPDATE affiliates SET balance = balance + $2 WHERE id = $1")
                .bind(affiliate.id.as_uuid())
                .bind(amount)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("credit_affiliate", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("decide_conversion", e))?;

        span.record("credited", credited.unwrap_or(0));
        Ok(conversion)
    }

    async fn list_conversions(
        &self,
        filter: &ConversionFilter,
        page: Page,
    ) -> Result<Paged<ConversionView>, StoreError> {
        let affiliate = filter.affiliate_id.map(|a| *a.as_uuid());
        let status = filter.status.map(|s| s.as_str());

        let mut tx = self.begin_snapshot("list_conversions").await?;
        let total = count(
            &mut tx,
            "list_conversions",
            sqlx::query(
                r#"
                SELECT COUNT(*) AS total
                FROM conversions v
                WHERE ($1::uuid IS NULL OR v.affiliate_id = $1)
                    AND ($2::text IS NULL OR v.status = $2)
                "#,
            )
            .bind(affiliate)
            .bind(status),
        )
        .await?;
        let rows = sqlx::query(
            r#"
            SELECT
                v.id, v.tenant_id, v.product_id, v.affiliate_id, v.order_id,
                v.order_amount, v.commission_amount, v.status, v.created_at, v.decided_at,
                a.code AS affiliate_code,
                a.email AS affiliate_email,
                p.name AS product_name,
                p.slug AS product_slug
            FROM conversions v
            JOIN affiliates a ON a.id = v.affiliate_id
            JOIN products p ON p.id = v.product_id
            WHERE ($1::uuid IS NULL OR v.affiliate_id = $1)
                AND ($2::text IS NULL OR v.status = $2)
            ORDER BY v.created_at DESC, v.id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(affiliate)
        .bind(status)
        .bind(i64::from(page.limit))
        .bind(offset(page))
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("list_conversions", e))?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("list_conversions", e))?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            items.push(ConversionView {
                conversion: decode_into::<ConversionRow, Conversion>(row)?,
                affiliate_code: get_column(row, "affiliate_code")?,
                affiliate_email: get_column(row, "affiliate_email")?,
                product_name: get_column(row, "product_name")?,
                product_slug: get_column(row, "product_slug")?,
            });
        }
        Ok(Paged::new(items, total, page))
    }

    // -- payouts --

    #[instrument(skip(self, policy), err)]
    async fn create_payout(
        &self,
        affiliate_id: AffiliateId,
        amount: i64,
        policy: &PayoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<Payout, StoreError> {
        let mut tx = self.begin("create_payout").await?;

        let mut affiliate = lock_affiliate(&mut tx, affiliate_id)
            .await?
            .ok_or_else(|| DomainError::not_found("affiliate", affiliate_id))?;
        let payout = open_payout(&mut affiliate, amount, policy, now)?;

        sqlx::query(&format!(
            "INSERT INTO payouts ({PAYOUT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
        ))
        .bind(payout.id.as_uuid())
        .bind(payout.tenant_id.as_uuid())
        .bind(payout.affiliate_id.as_uuid())
        .bind(payout.amount)
        .bind(payout.status.as_str())
        .bind(payout.requested_at)
        .bind(payout.processed_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_payout", e))?;

        sqlx::query("UPDATE affiliates SET balance = balance - $2 WHERE id = $1")
            .bind(affiliate.id.as_uuid())
            .bind(payout.amount)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("debit_affiliate", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("create_payout", e))?;
        Ok(payout)
    }

    #[instrument(skip(self), err)]
    async fn settle_payout(&self, id: PayoutId, now: DateTime<Utc>) -> Result<Payout, StoreError> {
        let mut tx = self.begin("settle_payout").await?;

        let row = sqlx::query(&format!(
            "SELECT {PAYOUT_COLUMNS} FROM payouts WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("settle_payout", e))?;
        let mut payout: Payout = match row {
            Some(row) => decode_into::<PayoutRow, Payout>(&row)?,
            None => return Err(DomainError::not_found("payout", id).into()),
        };

        payout.settle(now)?;

        sqlx::query("UPDATE payouts SET status = $2, processed_at = $3 WHERE id = $1")
            .bind(payout.id.as_uuid())
            .bind(payout.status.as_str())
            .bind(payout.processed_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("settle_payout", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("settle_payout", e))?;
        Ok(payout)
    }

    async fn list_payouts(
        &self,
        filter: &PayoutFilter,
        page: Page,
    ) -> Result<Paged<PayoutView>, StoreError> {
        let affiliate = filter.affiliate_id.map(|a| *a.as_uuid());
        let status = filter.status.map(|s| s.as_str());

        let mut tx = self.begin_snapshot("list_payouts").await?;
        let total = count(
            &mut tx,
            "list_payouts",
            sqlx::query(
                r#"
                SELECT COUNT(*) AS total
                FROM payouts p
                WHERE ($1::uuid IS NULL OR p.affiliate_id = $1)
                    AND ($2::text IS NULL OR p.status = $2)
                "#,
            )
            .bind(affiliate)
            .bind(status),
        )
        .await?;
        let rows = sqlx::query(
            r#"
            SELECT
                p.id, p.tenant_id, p.affiliate_id, p.amount, p.status,
                p.requested_at, p.processed_at,
                a.code AS affiliate_code,
                a.email AS affiliate_email
            FROM payouts p
            JOIN affiliates a ON a.id = p.affiliate_id
            WHERE ($1::uuid IS NULL OR p.affiliate_id = $1)
                AND ($2::text IS NULL OR p.status = $2)
            ORDER BY p.requested_at DESC, p.id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(affiliate)
        .bind(status)
        .bind(i64::from(page.limit))
        .bind(offset(page))
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("list_payouts", e))?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("list_payouts", e))?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            items.push(PayoutView {
                payout: decode_into::<PayoutRow, Payout>(row)?,
                affiliate_code: get_column(row, "affiliate_code")?,
                affiliate_email: get_column(row, "affiliate_email")?,
            });
        }
        Ok(Paged::new(items, total, page))
    }

    // -- reporting --

    #[instrument(skip(self), err)]
    async fn affiliate_snapshot(
        &self,
        id: AffiliateId,
    ) -> Result<Option<AffiliateSnapshot>, StoreError> {
        let mut tx = self.begin_snapshot("affiliate_snapshot").await?;

        let row = sqlx::query(&format!(
            "SELECT {AFFILIATE_COLUMNS} FROM affiliates WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("affiliate_snapshot", e))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let affiliate = decode_into::<AffiliateRow, Affiliate>(&row)?;

        let slug_row = sqlx::query(
            r#"
            SELECT slug
            FROM products
            WHERE tenant_id = $1 AND active
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            "#,
        )
        .bind(affiliate.tenant_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("affiliate_snapshot", e))?;
        let referral_product_slug = slug_row
            .map(|r| get_column::<String>(&r, "slug"))
            .transpose()?;

        let totals = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM clicks WHERE affiliate_id = $1) AS click_count,
                (SELECT COUNT(*) FROM conversions WHERE affiliate_id = $1) AS conversion_count,
                (SELECT COUNT(*) FROM conversions
                    WHERE affiliate_id = $1 AND status = 'pending') AS pending_count,
                (SELECT LEAST(COALESCE(SUM(commission_amount), 0), 9223372036854775807)::BIGINT FROM conversions
                    WHERE affiliate_id = $1 AND status = 'pending') AS pending_amount,
                (SELECT COUNT(*) FROM conversions
                    WHERE affiliate_id = $1 AND status = 'approved') AS approved_count,
                (SELECT LEAST(COALESCE(SUM(commission_amount), 0), 9223372036854775807)::BIGINT FROM conversions
                    WHERE affiliate_id = $1 AND status = 'approved') AS approved_amount,
                (SELECT LEAST(COALESCE(SUM(amount), 0), 9223372036854775807)::BIGINT FROM payouts
                    WHERE affiliate_id = $1 AND status = 'paid') AS paid_total,
                (SELECT LEAST(COALESCE(SUM(amount), 0), 9223372036854775807)::BIGINT FROM payouts
                    WHERE affiliate_id = $1) AS committed_payouts
            "#,
        )
        .bind(id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("affiliate_snapshot", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("affiliate_snapshot", e))?;

        Ok(Some(AffiliateSnapshot {
            affiliate,
            referral_product_slug,
            clicks: get_count(&totals, "click_count")?,
            conversions: get_count(&totals, "conversion_count")?,
            pending: CountAmount {
                count: get_count(&totals, "pending_count")?,
                amount: get_column(&totals, "pending_amount")?,
            },
            approved: CountAmount {
                count: get_count(&totals, "approved_count")?,
                amount: get_column(&totals, "approved_amount")?,
            },
            paid_total: get_column(&totals, "paid_total")?,
            committed_payouts: get_column(&totals, "committed_payouts")?,
        }))
    }

    #[instrument(skip(self), err)]
    async fn overview_snapshot(&self) -> Result<OverviewSnapshot, StoreError> {
        // One statement reads one snapshot.
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM affiliates WHERE status = 'active') AS active_affiliates,
                (SELECT COUNT(*) FROM clicks) AS click_count,
                (SELECT COUNT(*) FROM conversions) AS conversion_count,
                (SELECT COUNT(*) FROM payouts WHERE status = 'requested') AS pending_payout_count,
                (SELECT LEAST(COALESCE(SUM(amount), 0), 9223372036854775807)::BIGINT FROM payouts
                    WHERE status = 'requested') AS pending_payout_amount,
                (SELECT LEAST(COALESCE(SUM(order_amount), 0), 9223372036854775807)::BIGINT FROM conversions
                    WHERE status = 'approved') AS approved_order_amount,
                (SELECT LEAST(COALESCE(SUM(commission_amount), 0), 9223372036854775807)::BIGINT FROM conversions
                    WHERE status = 'approved') AS approved_commission
            "#,
        )
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("overview_snapshot", e))?;

        Ok(OverviewSnapshot {
            active_affiliates: get_count(&row, "active_affiliates")?,
            clicks: get_count(&row, "click_count")?,
            conversions: get_count(&row, "conversion_count")?,
            pending_payouts: CountAmount {
                count: get_count(&row, "pending_payout_count")?,
                amount: get_column(&row, "pending_payout_amount")?,
            },
            approved_order_amount: get_column(&row, "approved_order_amount")?,
            approved_commission: get_column(&row, "approved_commission")?,
        })
    }
}

/// Load and lock an affiliate row for the rest of the transaction.
async fn lock_affiliate(
    tx: &mut Transaction<'_, Postgres>,
    id: AffiliateId,
) -> Result<Option<Affiliate>, StoreError> {
    let row = sqlx::query(&format!(
        "SELECT {AFFILIATE_COLUMNS} FROM affiliates WHERE id = $1 FOR UPDATE"
    ))
    .bind(id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_affiliate", e))?;
    row.as_ref().map(decode_into::<AffiliateRow, Affiliate>).transpose()
}

async fn count(
    tx: &mut Transaction<'_, Postgres>,
    operation: &str,
    query: sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>,
) -> Result<u64, StoreError> {
    let row = query
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error(operation, e))?;
    get_count(&row, "total")
}

fn offset(page: Page) -> i64 {
    i64::try_from(page.offset()).unwrap_or(i64::MAX)
}

/// `%needle%` with LIKE metacharacters escaped.
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn cookie_days_to_db(days: u32) -> Result<i32, StoreError> {
    i32::try_from(days).map_err(|_| DomainError::validation("cookie duration out of range").into())
}

fn decode<R>(row: &PgRow) -> Result<R, StoreError>
where
    R: for<'r> FromRow<'r, PgRow>,
{
    R::from_row(row).map_err(|e| StoreError::Corrupt(format!("failed to decode row: {e}")))
}

fn decode_into<R, T>(row: &PgRow) -> Result<T, StoreError>
where
    R: for<'r> FromRow<'r, PgRow>,
    T: TryFrom<R, Error = StoreError>,
{
    decode::<R>(row)?.try_into()
}

fn decode_all<R, T>(rows: &[PgRow]) -> Result<Vec<T>, StoreError>
where
    R: for<'r> FromRow<'r, PgRow>,
    T: TryFrom<R, Error = StoreError>,
{
    rows.iter().map(decode_into::<R, T>).collect()
}

fn get_column<T>(row: &PgRow, column: &str) -> Result<T, StoreError>
where
    T: for<'r> sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Corrupt(format!("failed to read {column}: {e}")))
}

fn get_count(row: &PgRow, column: &str) -> Result<u64, StoreError> {
    let value: i64 = get_column(row, column)?;
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {column}: {value}")))
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            let constraint = db_err.constraint().unwrap_or("unknown").to_string();
            match db_err.code().as_deref() {
                // Unique violation
                Some("23505") => StoreError::Domain(DomainError::conflict(format!(
                    "{} already exists ({constraint})",
                    conflict_subject(&constraint)
                ))),
                // Foreign key violation
                Some("23503") => StoreError::Domain(DomainError::conflict(format!(
                    "referenced record missing ({constraint})"
                ))),
                // Check constraint violation
                Some("23514") => StoreError::Domain(DomainError::validation(format!(
                    "value rejected by {constraint}"
                ))),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool timed out in {}", operation))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::Io(e) => {
            StoreError::Unavailable(format!("io error in {}: {}", operation, e))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn conflict_subject(constraint: &str) -> &'static str {
    match constraint {
        "products_slug_key" => "product slug",
        "products_api_key_key" => "product api key",
        "affiliates_code_key" => "affiliate code",
        ORDER_PRODUCT_CONSTRAINT => "order",
        _ => "record",
    }
}

/// Check if an error is a unique constraint violation, optionally on a specific constraint.
fn is_unique_violation(err: &sqlx::Error, constraint: Option<&str>) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if db_err.code().as_deref() == Some("23505") {
            return constraint.is_none_or(|c| db_err.constraint() == Some(c));
        }
    }
    false
}

// SQLx row types

#[derive(Debug)]
struct TenantRow {
    id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for TenantRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(TenantRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<TenantRow> for Tenant {
    type Error = StoreError;

    fn try_from(row: TenantRow) -> Result<Self, Self::Error> {
        Ok(Tenant {
            id: TenantId::from_uuid(row.id),
            name: row.name,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug)]
struct ProductRow {
    id: Uuid,
    tenant_id: Uuid,
    name: String,
    slug: String,
    domain: String,
    api_key: String,
    commission_type: String,
    commission_value: Decimal,
    cookie_duration_days: i32,
    active: bool,
    created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for ProductRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductRow {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            name: row.try_get("name")?,
            slug: row.try_get("slug")?,
            domain: row.try_get("domain")?,
            api_key: row.try_get("api_key")?,
            commission_type: row.try_get("commission_type")?,
            commission_value: row.try_get("commission_value")?,
            cookie_duration_days: row.try_get("cookie_duration_days")?,
            active: row.try_get("active")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let commission = CommissionRule::from_parts(&row.commission_type, row.commission_value)
            .map_err(|e| StoreError::Corrupt(format!("product {}: {e}", row.slug)))?;
        let cookie_duration_days = u32::try_from(row.cookie_duration_days).map_err(|_| {
            StoreError::Corrupt(format!(
                "product {}: negative cookie duration {}",
                row.slug, row.cookie_duration_days
            ))
        })?;
        Ok(Product {
            id: ProductId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            name: row.name,
            slug: row.slug,
            domain: row.domain,
            api_key: row.api_key,
            commission,
            cookie_duration_days,
            active: row.active,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug)]
struct AffiliateRow {
    id: Uuid,
    tenant_id: Uuid,
    code: String,
    email: String,
    status: String,
    balance: i64,
    created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for AffiliateRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(AffiliateRow {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            code: row.try_get("code")?,
            email: row.try_get("email")?,
            status: row.try_get("status")?,
            balance: row.try_get("balance")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<AffiliateRow> for Affiliate {
    type Error = StoreError;

    fn try_from(row: AffiliateRow) -> Result<Self, Self::Error> {
        let status: AffiliateStatus = row
            .status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("affiliate {}: {e}", row.code)))?;
        let code = row.code.clone();
        Affiliate::restore(
            AffiliateId::from_uuid(row.id),
            TenantId::from_uuid(row.tenant_id),
            row.code,
            row.email,
            status,
            row.balance,
            row.created_at,
        )
        .map_err(|e| StoreError::Corrupt(format!("affiliate {code}: {e}")))
    }
}

#[derive(Debug)]
struct ConversionRow {
    id: Uuid,
    tenant_id: Uuid,
    product_id: Uuid,
    affiliate_id: Uuid,
    order_id: String,
    order_amount: i64,
    commission_amount: i64,
    status: String,
    created_at: DateTime<Utc>,
    decided_at: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for ConversionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ConversionRow {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            product_id: row.try_get("product_id")?,
            affiliate_id: row.try_get("affiliate_id")?,
            order_id: row.try_get("order_id")?,
            order_amount: row.try_get("order_amount")?,
            commission_amount: row.try_get("commission_amount")?,
            status: row.try_get("status")?,
            created_at: row.try_get("created_at")?,
            decided_at: row.try_get("decided_at")?,
        })
    }
}

impl TryFrom<ConversionRow> for Conversion {
    type Error = StoreError;

    fn try_from(row: ConversionRow) -> Result<Self, Self::Error> {
        let corrupt = |e: DomainError| StoreError::Corrupt(format!("conversion {}: {e}", row.id));
        let status: ConversionStatus = row.status.parse().map_err(corrupt)?;
        let order_id = OrderId::parse(&row.order_id).map_err(corrupt)?;
        Ok(Conversion {
            id: ConversionId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            product_id: ProductId::from_uuid(row.product_id),
            affiliate_id: AffiliateId::from_uuid(row.affiliate_id),
            order_id,
            order_amount: row.order_amount,
            commission_amount: row.commission_amount,
            status,
            created_at: row.created_at,
            decided_at: row.decided_at,
        })
    }
}

#[derive(Debug)]
struct PayoutRow {
    id: Uuid,
    tenant_id: Uuid,
    affiliate_id: Uuid,
    amount: i64,
    status: String,
    requested_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl<'r> sqlx::FromRow<'r, PgRow> for PayoutRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(PayoutRow {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            affiliate_id: row.try_get("affiliate_id")?,
            amount: row.try_get("amount")?,
            status: row.try_get("status")?,
            requested_at: row.try_get("requested_at")?,
            processed_at: row.try_get("processed_at")?,
        })
    }
}

impl TryFrom<PayoutRow> for Payout {
    type Error = StoreError;

    fn try_from(row: PayoutRow) -> Result<Self, Self::Error> {
        let status: PayoutStatus = row
            .status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("payout {}: {e}", row.id)))?;
        Ok(Payout {
            id: PayoutId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            affiliate_id: AffiliateId::from_uuid(row.affiliate_id),
            amount: row.amount,
            status,
            requested_at: row.requested_at,
            processed_at: row.processed_at,
        })
    }
}
