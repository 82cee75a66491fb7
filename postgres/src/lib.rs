//! `PostgreSQL` entity store for Socialmart.
//!
//! Implements [`EntityStore`] over sqlx:
//!
//! - Aggregate counters change through `UPDATE ... SET x = x + $n`, never read-modify-write
//! - `sales.transaction_id` is `UNIQUE`, so a second settlement of a transaction fails with
//!   [`StoreError::Duplicate`]
//! - Each guarded settlement step flips its flag and applies its increment inside one SQL
//!   transaction
//! - Product views lock the product row, so the uniqueness check and the counter update
//!   cannot interleave with a concurrent view
//!
//! # Example
//!
//! ```no_run
//! use socialmart_postgres::{PoolSettings, PostgresEntityStore};
//!
//! # async fn example() -> Result<(), socialmart_core::StoreError> {
//! let store = PostgresEntityStore::connect("postgres://localhost/socialmart", &PoolSettings::default()).await?;
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use socialmart_core::store::{
    PurgeCounts, ProductFilter, SegmentCounts, StepOutcome, StoreFuture, ViewOutcome,
};
use socialmart_core::{
    ActivityEntry, Customer, CustomerId, CustomerTier, EntityStore, Money, PaymentStatus, Period,
    Product, ProductId, ProductView, Sale, SettlementProgress, StoreError, Transaction,
    TransactionId, TransactionStatus,
};
use socialmart_core::entity::{ACTIVITY_RETENTION, VIEW_RETENTION};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{PgConnection, Postgres};
use std::time::Duration;

macro_rules! product_columns {
    () => {
        "id, seller_id, platform, username, status, price, region, followers, engagement, \
         age_months, average_likes, average_comments, two_factor_enabled, \
         original_email_available, credentials, total_views, unique_views, sales_count, \
         total_revenue, last_sale_at, popularity, created_at, updated_at"
    };
}

macro_rules! customer_columns {
    () => {
        "id, name, email, segment, status, total_spent, total_orders, last_order_at, created_at"
    };
}

macro_rules! transaction_columns {
    () => {
        "id, buyer_id, product_id, amount, currency, payment_method, status, payment_status, \
         metadata, created_at, updated_at"
    };
}

macro_rules! sale_columns {
    () => {
        "id, transaction_id, product_id, customer_id, amount, quantity, profit, region, \
         product_type, payment_method, created_at"
    };
}

macro_rules! settlement_columns {
    () => {
        "transaction_id, sale_id, product_applied, customer_applied, activity_logged, \
         started_at, completed_at"
    };
}

mod rows;

use rows::{db_count, db_error, db_json, db_money, db_small};

/// Connection pool sizing.
#[derive(Clone, Debug)]
pub struct PoolSettings {
    /// Maximum pooled connections
    pub max_connections: u32,
    /// Connections kept open when idle
    pub min_connections: u32,
    /// Time to wait for a free connection
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// `PostgreSQL`-backed [`EntityStore`].
#[derive(Clone, Debug)]
pub struct PostgresEntityStore {
    pool: PgPool,
}

impl PostgresEntityStore {
    /// Connect a new pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the database cannot be reached.
    pub async fn connect(database_url: &str, settings: &PoolSettings) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to connect: {e}")))?;

        tracing::info!(max_connections = settings.max_connections, "Connected to PostgreSQL");
        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the bundled migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin(&self, entity: &'static str) -> Result<sqlx::Transaction<'static, Postgres>, StoreError> {
        self.pool.begin().await.map_err(|e| db_error(entity, e))
    }
}

/// Flag columns of the `settlements` table.
#[derive(Clone, Copy)]
enum Step {
    Product,
    Customer,
    Activity,
}

impl Step {
    const fn claim_sql(self) -> &'static str {
        match self {
            Self::Product => {
                "UPDATE settlements SET product_applied = TRUE \
                 WHERE transaction_id = $1 AND NOT product_applied RETURNING transaction_id"
            }
            Self::Customer => {
                "UPDATE settlements SET customer_applied = TRUE \
                 WHERE transaction_id = $1 AND NOT customer_applied RETURNING transaction_id"
            }
            Self::Activity => {
                "UPDATE settlements SET activity_logged = TRUE \
                 WHERE transaction_id = $1 AND NOT activity_logged RETURNING transaction_id"
            }
        }
    }
}

/// Flip one settlement flag if it is still unset.
///
/// Returns `Ok(true)` when this call flipped it, `Ok(false)` when it was already set.
async fn claim_step(
    conn: &mut PgConnection,
    transaction_id: TransactionId,
    step: Step,
) -> Result<bool, StoreError> {
    let claimed: Option<(uuid::Uuid,)> = sqlx::query_as(step.claim_sql())
        .bind(*transaction_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| db_error("settlement", e))?;
    if claimed.is_some() {
        return Ok(true);
    }

    let exists: (bool,) =
        sqlx::query_as("SELECT EXISTS (SELECT 1 FROM settlements WHERE transaction_id = $1)")
            .bind(*transaction_id.as_uuid())
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| db_error("settlement", e))?;
    if exists.0 {
        Ok(false)
    } else {
        Err(StoreError::not_found("settlement", transaction_id))
    }
}

impl EntityStore for PostgresEntityStore {
    fn insert_product(&self, product: Product) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(concat!(
                "INSERT INTO products (",
                product_columns!(),
                ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, \
                 $16, $17, $18, $19, $20, $21, $22, $23)"
            ))
            .bind(*product.id.as_uuid())
            .bind(product.seller_id.map(|id| *id.as_uuid()))
            .bind(product.platform.as_str())
            .bind(&product.username)
            .bind(product.status.as_str())
            .bind(db_money(product.price)?)
            .bind(&product.region)
            .bind(db_count(product.stats.followers)?)
            .bind(product.stats.engagement)
            .bind(db_small(product.stats.age_months)?)
            .bind(db_count(product.stats.average_likes)?)
            .bind(db_count(product.stats.average_comments)?)
            .bind(product.security.two_factor_enabled)
            .bind(product.security.original_email_available)
            .bind(db_json(&product.credentials)?)
            .bind(db_count(product.views.total)?)
            .bind(db_count(product.views.unique)?)
            .bind(db_count(product.sales.count)?)
            .bind(db_money(product.sales.total_revenue)?)
            .bind(product.sales.last_sale_at)
            .bind(product.popularity)
            .bind(product.created_at)
            .bind(product.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("product", e))?;
            Ok(())
        })
    }

    fn get_product(&self, id: ProductId) -> StoreFuture<'_, Product> {
        Box::pin(async move {
            let row = sqlx::query(concat!("SELECT ", product_columns!(), " FROM products WHERE id = $1"))
                .bind(*id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("product", e))?;
            row.as_ref().map_or_else(|| Err(StoreError::not_found("product", id)), rows::product)
        })
    }

    fn list_products(&self, filter: ProductFilter) -> StoreFuture<'_, Vec<Product>> {
        Box::pin(async move {
            let statuses: Vec<String> =
                filter.statuses.iter().map(|s| s.as_str().to_string()).collect();
            let found = sqlx::query(concat!(
                "SELECT ",
                product_columns!(),
                " FROM products \
                 WHERE (cardinality($1::TEXT[]) = 0 OR status = ANY($1)) \
                   AND (NOT $2 OR sales_count > 0) \
                   AND ($3::TEXT IS NULL OR region = $3) \
                 ORDER BY created_at, id"
            ))
            .bind(statuses)
            .bind(filter.with_sales_only)
            .bind(filter.region)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("product", e))?;
            found.iter().map(rows::product).collect()
        })
    }

    fn record_product_view(
        &self,
        view: ProductView,
        dedupe_since: DateTime<Utc>,
    ) -> StoreFuture<'_, ViewOutcome> {
        Box::pin(async move {
            let product_id = *view.product_id.as_uuid();
            let mut tx = self.begin("product_view").await?;

            let locked: Option<(uuid::Uuid,)> =
                sqlx::query_as("SELECT id FROM products WHERE id = $1 FOR UPDATE")
                    .bind(product_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| db_error("product", e))?;
            if locked.is_none() {
                return Err(StoreError::not_found("product", view.product_id));
            }

            let (seen,): (bool,) = sqlx::query_as(
                "SELECT EXISTS (SELECT 1 FROM product_views \
                 WHERE product_id = $1 AND viewer_id = $2 AND viewed_at >= $3)",
            )
            .bind(product_id)
            .bind(*view.viewer_id.as_uuid())
            .bind(dedupe_since)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| db_error("product_view", e))?;
            let unique = !seen;

            sqlx::query("INSERT INTO product_views (product_id, viewer_id, viewed_at) VALUES ($1, $2, $3)")
                .bind(product_id)
                .bind(*view.viewer_id.as_uuid())
                .bind(view.viewed_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("product_view", e))?;

            let (total, unique_total): (i64, i64) = sqlx::query_as(
                "UPDATE products \
                 SET total_views = total_views + 1, \
                     unique_views = unique_views + CASE WHEN $2 THEN 1 ELSE 0 END \
                 WHERE id = $1 \
                 RETURNING total_views, unique_views",
            )
            .bind(product_id)
            .bind(unique)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| db_error("product", e))?;

            tx.commit().await.map_err(|e| db_error("product_view", e))?;

            Ok(ViewOutcome {
                unique,
                total_views: u64::try_from(total).unwrap_or_default(),
                unique_views: u64::try_from(unique_total).unwrap_or_default(),
            })
        })
    }

    fn set_product_popularity(
        &self,
        id: ProductId,
        score: f64,
        observed_sales_count: u64,
    ) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let result = sqlx::query("UPDATE products SET popularity = $2 WHERE id = $1 AND sales_count = $3")
                .bind(*id.as_uuid())
                .bind(score)
                .bind(db_count(observed_sales_count)?)
                .execute(&self.pool)
                .await
                .map_err(|e| db_error("product", e))?;
            if result.rows_affected() > 0 {
                return Ok(true);
            }
            // Distinguish a lost race from a missing product
            self.get_product(id).await.map(|_| false)
        })
    }

    fn insert_customer(&self, customer: Customer) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(concat!(
                "INSERT INTO customers (",
                customer_columns!(),
                ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
            ))
            .bind(*customer.id.as_uuid())
            .bind(&customer.name)
            .bind(&customer.email)
            .bind(customer.segment.as_str())
            .bind(customer.status.as_str())
            .bind(db_money(customer.metrics.total_spent)?)
            .bind(db_count(customer.metrics.total_orders)?)
            .bind(customer.metrics.last_order_at)
            .bind(customer.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("customer", e))?;
            Ok(())
        })
    }

    fn get_customer(&self, id: CustomerId) -> StoreFuture<'_, Customer> {
        Box::pin(async move {
            let row = sqlx::query(concat!("SELECT ", customer_columns!(), " FROM customers WHERE id = $1"))
                .bind(*id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("customer", e))?;
            row.as_ref().map_or_else(|| Err(StoreError::not_found("customer", id)), rows::customer)
        })
    }

    fn increment_customer_spend(
        &self,
        id: CustomerId,
        amount: Money,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Customer> {
        Box::pin(async move {
            let row = sqlx::query(concat!(
                "UPDATE customers \
                 SET total_spent = total_spent + $2, total_orders = total_orders + 1, last_order_at = $3 \
                 WHERE id = $1 RETURNING ",
                customer_columns!()
            ))
            .bind(*id.as_uuid())
            .bind(db_money(amount)?)
            .bind(at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("customer", e))?;
            row.as_ref().map_or_else(|| Err(StoreError::not_found("customer", id)), rows::customer)
        })
    }

    fn set_customer_segment(
        &self,
        id: CustomerId,
        tier: CustomerTier,
        observed_total: Option<Money>,
    ) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let observed = observed_total.map(db_money).transpose()?;
            let result = sqlx::query(
                "UPDATE customers SET segment = $2 \
                 WHERE id = $1 AND ($3::BIGINT IS NULL OR total_spent = $3)",
            )
            .bind(*id.as_uuid())
            .bind(tier.as_str())
            .bind(observed)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("customer", e))?;
            if result.rows_affected() > 0 {
                return Ok(true);
            }
            self.get_customer(id).await.map(|_| false)
        })
    }

    fn customers_joined_between(&self, period: Period) -> StoreFuture<'_, Vec<Customer>> {
        Box::pin(async move {
            let found = sqlx::query(concat!(
                "SELECT ",
                customer_columns!(),
                " FROM customers WHERE created_at >= $1 AND created_at < $2 ORDER BY created_at, id"
            ))
            .bind(period.start)
            .bind(period.end)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("customer", e))?;
            found.iter().map(rows::customer).collect()
        })
    }

    fn count_customers(&self) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM customers")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| db_error("customer", e))?;
            Ok(u64::try_from(count).unwrap_or_default())
        })
    }

    fn segment_counts(&self) -> StoreFuture<'_, SegmentCounts> {
        Box::pin(async move {
            let grouped: Vec<(String, i64)> =
                sqlx::query_as("SELECT segment, COUNT(*) FROM customers GROUP BY segment")
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| db_error("customer", e))?;

            let mut counts = SegmentCounts::default();
            for (segment, count) in grouped {
                let tier: CustomerTier =
                    segment.parse().map_err(|e: socialmart_core::types::UnknownVariant| {
                        StoreError::Corrupt(e.to_string())
                    })?;
                counts.add(tier, u64::try_from(count).unwrap_or_default());
            }
            Ok(counts)
        })
    }

    fn insert_transaction(&self, transaction: Transaction) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(concat!(
                "INSERT INTO transactions (",
                transaction_columns!(),
                ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
            ))
            .bind(*transaction.id.as_uuid())
            .bind(*transaction.buyer_id.as_uuid())
            .bind(*transaction.product_id.as_uuid())
            .bind(db_money(transaction.amount)?)
            .bind(&transaction.currency)
            .bind(&transaction.payment_method)
            .bind(transaction.status.as_str())
            .bind(transaction.payment_status.as_str())
            .bind(db_json(&transaction.metadata)?)
            .bind(transaction.created_at)
            .bind(transaction.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("transaction", e))?;
            Ok(())
        })
    }

    fn get_transaction(&self, id: TransactionId) -> StoreFuture<'_, Transaction> {
        Box::pin(async move {
            let row = sqlx::query(concat!("SELECT ", transaction_columns!(), " FROM transactions WHERE id = $1"))
                .bind(*id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("transaction", e))?;
            row.as_ref().map_or_else(|| Err(StoreError::not_found("transaction", id)), rows::transaction)
        })
    }

    fn update_transaction_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
        payment_status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Transaction> {
        Box::pin(async move {
            let row = sqlx::query(concat!(
                "UPDATE transactions SET status = $2, payment_status = $3, updated_at = $4 \
                 WHERE id = $1 RETURNING ",
                transaction_columns!()
            ))
            .bind(*id.as_uuid())
            .bind(status.as_str())
            .bind(payment_status.as_str())
            .bind(at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("transaction", e))?;
            row.as_ref().map_or_else(|| Err(StoreError::not_found("transaction", id)), rows::transaction)
        })
    }

    fn transactions_between(&self, period: Period) -> StoreFuture<'_, Vec<Transaction>> {
        Box::pin(async move {
            let found = sqlx::query(concat!(
                "SELECT ",
                transaction_columns!(),
                " FROM transactions WHERE created_at >= $1 AND created_at < $2 ORDER BY created_at, id"
            ))
            .bind(period.start)
            .bind(period.end)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("transaction", e))?;
            found.iter().map(rows::transaction).collect()
        })
    }

    fn begin_settlement(&self, sale: Sale) -> StoreFuture<'_, SettlementProgress> {
        Box::pin(async move {
            let mut tx = self.begin("sale").await?;

            sqlx::query(concat!(
                "INSERT INTO sales (",
                sale_columns!(),
                ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
            ))
            .bind(*sale.id.as_uuid())
            .bind(*sale.transaction_id.as_uuid())
            .bind(*sale.product_id.as_uuid())
            .bind(*sale.customer_id.as_uuid())
            .bind(db_money(sale.amount)?)
            .bind(db_small(sale.quantity)?)
            .bind(db_money(sale.profit)?)
            .bind(&sale.region)
            .bind(sale.product_type.as_str())
            .bind(&sale.payment_method)
            .bind(sale.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("sale", e))?;

            let row = sqlx::query(concat!(
                "INSERT INTO settlements (transaction_id, sale_id, started_at) VALUES ($1, $2, $3) \
                 RETURNING ",
                settlement_columns!()
            ))
            .bind(*sale.transaction_id.as_uuid())
            .bind(*sale.id.as_uuid())
            .bind(sale.created_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| db_error("settlement", e))?;
            let progress = rows::settlement(&row)?;

            tx.commit().await.map_err(|e| db_error("sale", e))?;
            Ok(progress)
        })
    }

    fn find_sale_by_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> StoreFuture<'_, Option<Sale>> {
        Box::pin(async move {
            let row = sqlx::query(concat!("SELECT ", sale_columns!(), " FROM sales WHERE transaction_id = $1"))
                .bind(*transaction_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("sale", e))?;
            row.as_ref().map(rows::sale).transpose()
        })
    }

    fn settlement_progress(
        &self,
        transaction_id: TransactionId,
    ) -> StoreFuture<'_, Option<SettlementProgress>> {
        Box::pin(async move {
            let row = sqlx::query(concat!(
                "SELECT ",
                settlement_columns!(),
                " FROM settlements WHERE transaction_id = $1"
            ))
            .bind(*transaction_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("settlement", e))?;
            row.as_ref().map(rows::settlement).transpose()
        })
    }

    fn apply_product_sale(
        &self,
        transaction_id: TransactionId,
        product_id: ProductId,
        amount: Money,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, StepOutcome<Product>> {
        Box::pin(async move {
            let mut tx = self.begin("product").await?;
            if !claim_step(&mut tx, transaction_id, Step::Product).await? {
                return Ok(StepOutcome::AlreadyApplied);
            }

            let row = sqlx::query(concat!(
                "UPDATE products \
                 SET sales_count = sales_count + 1, total_revenue = total_revenue + $2, \
                     last_sale_at = $3, status = 'sold', updated_at = $3 \
                 WHERE id = $1 RETURNING ",
                product_columns!()
            ))
            .bind(*product_id.as_uuid())
            .bind(db_money(amount)?)
            .bind(at)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_error("product", e))?;
            let Some(row) = row else {
                return Err(StoreError::not_found("product", product_id));
            };
            let product = rows::product(&row)?;

            tx.commit().await.map_err(|e| db_error("product", e))?;
            Ok(StepOutcome::Applied(product))
        })
    }

    fn apply_customer_spend(
        &self,
        transaction_id: TransactionId,
        customer_id: CustomerId,
        amount: Money,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, StepOutcome<Customer>> {
        Box::pin(async move {
            let mut tx = self.begin("customer").await?;
            if !claim_step(&mut tx, transaction_id, Step::Customer).await? {
                return Ok(StepOutcome::AlreadyApplied);
            }

            let row = sqlx::query(concat!(
                "UPDATE customers \
                 SET total_spent = total_spent + $2, total_orders = total_orders + 1, last_order_at = $3 \
                 WHERE id = $1 RETURNING ",
                customer_columns!()
            ))
            .bind(*customer_id.as_uuid())
            .bind(db_money(amount)?)
            .bind(at)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_error("customer", e))?;
            let Some(row) = row else {
                return Err(StoreError::not_found("customer", customer_id));
            };
            let customer = rows::customer(&row)?;

            tx.commit().await.map_err(|e| db_error("customer", e))?;
            Ok(StepOutcome::Applied(customer))
        })
    }

    fn append_settlement_activity(
        &self,
        transaction_id: TransactionId,
        entry: ActivityEntry,
    ) -> StoreFuture<'_, StepOutcome<()>> {
        Box::pin(async move {
            let mut tx = self.begin("activity").await?;
            if !claim_step(&mut tx, transaction_id, Step::Activity).await? {
                return Ok(StepOutcome::AlreadyApplied);
            }
            insert_activity(&mut tx, &entry).await?;
            tx.commit().await.map_err(|e| db_error("activity", e))?;
            Ok(StepOutcome::Applied(()))
        })
    }

    fn finish_settlement(
        &self,
        transaction_id: TransactionId,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, SettlementProgress> {
        Box::pin(async move {
            let row = sqlx::query(concat!(
                "UPDATE settlements SET completed_at = COALESCE(completed_at, $2) \
                 WHERE transaction_id = $1 RETURNING ",
                settlement_columns!()
            ))
            .bind(*transaction_id.as_uuid())
            .bind(at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("settlement", e))?;
            row.as_ref()
                .map_or_else(|| Err(StoreError::not_found("settlement", transaction_id)), rows::settlement)
        })
    }

    fn sales_between(&self, period: Period, region: Option<String>) -> StoreFuture<'_, Vec<Sale>> {
        Box::pin(async move {
            let found = sqlx::query(concat!(
                "SELECT ",
                sale_columns!(),
                " FROM sales \
                 WHERE created_at >= $1 AND created_at < $2 AND ($3::TEXT IS NULL OR region = $3) \
                   AND NOT EXISTS (SELECT 1 FROM transactions t \
                                   WHERE t.id = sales.transaction_id AND t.payment_status = 'refunded') \
                 ORDER BY created_at, id"
            ))
            .bind(period.start)
            .bind(period.end)
            .bind(region)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("sale", e))?;
            found.iter().map(rows::sale).collect()
        })
    }

    fn append_activity(&self, entry: ActivityEntry) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut conn = self.pool.acquire().await.map_err(|e| db_error("activity", e))?;
            insert_activity(&mut conn, &entry).await
        })
    }

    fn recent_activity(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> StoreFuture<'_, Vec<ActivityEntry>> {
        Box::pin(async move {
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let found = sqlx::query(
                "SELECT id, customer_id, product_id, transaction_id, kind, details, created_at \
                 FROM activity_log WHERE created_at >= $1 ORDER BY created_at DESC LIMIT $2",
            )
            .bind(since)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("activity", e))?;
            found.iter().map(rows::activity).collect()
        })
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> StoreFuture<'_, PurgeCounts> {
        Box::pin(async move {
            let activities = sqlx::query("DELETE FROM activity_log WHERE created_at < $1")
                .bind(now - ACTIVITY_RETENTION)
                .execute(&self.pool)
                .await
                .map_err(|e| db_error("activity", e))?
                .rows_affected();
            let views = sqlx::query("DELETE FROM product_views WHERE viewed_at < $1")
                .bind(now - VIEW_RETENTION)
                .execute(&self.pool)
                .await
                .map_err(|e| db_error("product_view", e))?
                .rows_affected();

            tracing::debug!(activities, views, "Purged expired rows");
            Ok(PurgeCounts { activities, views })
        })
    }

    fn save_sales_report(
        &self,
        period: Period,
        report: serde_json::Value,
        generated_at: DateTime<Utc>,
    ) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO sales_reports (period_start, period_end, report, generated_at) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(period.start)
            .bind(period.end)
            .bind(report)
            .bind(generated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("sales_report", e))?;
            Ok(())
        })
    }
}

async fn insert_activity(conn: &mut PgConnection, entry: &ActivityEntry) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO activity_log (id, customer_id, product_id, transaction_id, kind, details, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(*entry.id.as_uuid())
    .bind(*entry.customer_id.as_uuid())
    .bind(entry.product_id.map(|id| *id.as_uuid()))
    .bind(entry.transaction_id.map(|id| *id.as_uuid()))
    .bind(entry.kind.as_str())
    .bind(&entry.details)
    .bind(entry.created_at)
    .execute(conn)
    .await
    .map_err(|e| db_error("activity", e))?;
    Ok(())
}
