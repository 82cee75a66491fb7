//! Row decoding and value conversion between the domain types and SQL columns.
//!
//! Monetary amounts and counters are `BIGINT`; enumerations are stored as their lowercase
//! labels; credentials and transaction metadata are `JSONB`.

use socialmart_core::entity::{
    AccountCredentials, AccountSecurity, AccountStats, CustomerMetrics, SalesCounters,
    ViewCounters,
};
use socialmart_core::types::UnknownVariant;
use socialmart_core::{
    ActivityEntry, ActivityId, Customer, CustomerId, Money, Product, ProductId, Sale, SaleId,
    SettlementProgress, StoreError, Transaction, TransactionId, TransactionMetadata,
};
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row};
use std::str::FromStr;
use uuid::Uuid;

/// Map a sqlx error raised while working on `entity` records.
pub(crate) fn db_error(entity: &'static str, error: sqlx::Error) -> StoreError {
    metrics::counter!("entity_store_errors_total", "entity" => entity).increment(1);
    match error {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate {
            entity,
            key: db.constraint().unwrap_or("unique constraint").to_string(),
        },
        sqlx::Error::PoolTimedOut => StoreError::Timeout(format!("{entity}: connection pool timed out")),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt(format!("{entity}: {error}"))
        }
        other => StoreError::Unavailable(format!("{entity}: {other}")),
    }
}

pub(crate) fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column).map_err(|e| StoreError::Corrupt(format!("column {column}: {e}")))
}

fn uuid(row: &PgRow, column: &str) -> Result<Uuid, StoreError> {
    get(row, column)
}

fn optional_uuid(row: &PgRow, column: &str) -> Result<Option<Uuid>, StoreError> {
    get(row, column)
}

pub(crate) fn money(row: &PgRow, column: &str) -> Result<Money, StoreError> {
    let raw: i64 = get(row, column)?;
    u64::try_from(raw)
        .map(Money::from_minor)
        .map_err(|_| StoreError::Corrupt(format!("column {column}: negative amount {raw}")))
}

pub(crate) fn count(row: &PgRow, column: &str) -> Result<u64, StoreError> {
    let raw: i64 = get(row, column)?;
    u64::try_from(raw).map_err(|_| StoreError::Corrupt(format!("column {column}: negative count {raw}")))
}

fn small_count(row: &PgRow, column: &str) -> Result<u32, StoreError> {
    let raw: i32 = get(row, column)?;
    u32::try_from(raw).map_err(|_| StoreError::Corrupt(format!("column {column}: negative value {raw}")))
}

pub(crate) fn label<T>(row: &PgRow, column: &str) -> Result<T, StoreError>
where
    T: FromStr<Err = UnknownVariant>,
{
    let raw: String = get(row, column)?;
    raw.parse().map_err(|e: UnknownVariant| StoreError::Corrupt(e.to_string()))
}

fn json<T: serde::de::DeserializeOwned>(row: &PgRow, column: &str) -> Result<T, StoreError> {
    let value: serde_json::Value = get(row, column)?;
    serde_json::from_value(value).map_err(|e| StoreError::Corrupt(format!("column {column}: {e}")))
}

/// Bind form of an amount.
pub(crate) fn db_money(amount: Money) -> Result<i64, StoreError> {
    db_count(amount.minor())
}

/// Bind form of a counter.
pub(crate) fn db_count(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Serialization(format!("{value} exceeds BIGINT")))
}

/// Bind form of a small counter.
pub(crate) fn db_small(value: u32) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Serialization(format!("{value} exceeds INTEGER")))
}

/// Bind form of a JSONB value.
pub(crate) fn db_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

pub(crate) fn product(row: &PgRow) -> Result<Product, StoreError> {
    let credentials: AccountCredentials = json(row, "credentials")?;
    Ok(Product {
        id: ProductId::from_uuid(uuid(row, "id")?),
        seller_id: optional_uuid(row, "seller_id")?.map(CustomerId::from_uuid),
        platform: label(row, "platform")?,
        username: get(row, "username")?,
        status: label(row, "status")?,
        price: money(row, "price")?,
        region: get(row, "region")?,
        stats: AccountStats {
            followers: count(row, "followers")?,
            engagement: get(row, "engagement")?,
            age_months: small_count(row, "age_months")?,
            average_likes: count(row, "average_likes")?,
            average_comments: count(row, "average_comments")?,
        },
        security: AccountSecurity {
            two_factor_enabled: get(row, "two_factor_enabled")?,
            original_email_available: get(row, "original_email_available")?,
        },
        credentials,
        views: ViewCounters {
            total: count(row, "total_views")?,
            unique: count(row, "unique_views")?,
        },
        sales: SalesCounters {
            count: count(row, "sales_count")?,
            total_revenue: money(row, "total_revenue")?,
            last_sale_at: get(row, "last_sale_at")?,
        },
        popularity: get(row, "popularity")?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

pub(crate) fn customer(row: &PgRow) -> Result<Customer, StoreError> {
    Ok(Customer {
        id: CustomerId::from_uuid(uuid(row, "id")?),
        name: get(row, "name")?,
        email: get(row, "email")?,
        segment: label(row, "segment")?,
        status: label(row, "status")?,
        metrics: CustomerMetrics {
            total_spent: money(row, "total_spent")?,
            total_orders: count(row, "total_orders")?,
            last_order_at: get(row, "last_order_at")?,
        },
        created_at: get(row, "created_at")?,
    })
}

pub(crate) fn transaction(row: &PgRow) -> Result<Transaction, StoreError> {
    let metadata: TransactionMetadata = json(row, "metadata")?;
    Ok(Transaction {
        id: TransactionId::from_uuid(uuid(row, "id")?),
        buyer_id: CustomerId::from_uuid(uuid(row, "buyer_id")?),
        product_id: ProductId::from_uuid(uuid(row, "product_id")?),
        amount: money(row, "amount")?,
        currency: get(row, "currency")?,
        payment_method: get(row, "payment_method")?,
        status: label(row, "status")?,
        payment_status: label(row, "payment_status")?,
        metadata,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

pub(crate) fn sale(row: &PgRow) -> Result<Sale, StoreError> {
    Ok(Sale {
        id: SaleId::from_uuid(uuid(row, "id")?),
        transaction_id: TransactionId::from_uuid(uuid(row, "transaction_id")?),
        product_id: ProductId::from_uuid(uuid(row, "product_id")?),
        customer_id: CustomerId::from_uuid(uuid(row, "customer_id")?),
        amount: money(row, "amount")?,
        quantity: small_count(row, "quantity")?,
        profit: money(row, "profit")?,
        region: get(row, "region")?,
        product_type: label(row, "product_type")?,
        payment_method: get(row, "payment_method")?,
        created_at: get(row, "created_at")?,
    })
}

pub(crate) fn settlement(row: &PgRow) -> Result<SettlementProgress, StoreError> {
    Ok(SettlementProgress {
        transaction_id: TransactionId::from_uuid(uuid(row, "transaction_id")?),
        sale_id: SaleId::from_uuid(uuid(row, "sale_id")?),
        product_applied: get(row, "product_applied")?,
        customer_applied: get(row, "customer_applied")?,
        activity_logged: get(row, "activity_logged")?,
        started_at: get(row, "started_at")?,
        completed_at: get(row, "completed_at")?,
    })
}

pub(crate) fn activity(row: &PgRow) -> Result<ActivityEntry, StoreError> {
    Ok(ActivityEntry {
        id: ActivityId::from_uuid(uuid(row, "id")?),
        customer_id: CustomerId::from_uuid(uuid(row, "customer_id")?),
        product_id: optional_uuid(row, "product_id")?.map(ProductId::from_uuid),
        transaction_id: optional_uuid(row, "transaction_id")?.map(TransactionId::from_uuid),
        kind: label(row, "kind")?,
        details: get(row, "details")?,
        created_at: get(row, "created_at")?,
    })
}
