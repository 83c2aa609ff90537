use std::time::Duration;

use async_trait::async_trait;
use common::{OrderId, UserId};
use domain::{Money, Order, OrderLine, OrderStatus, Product, ProductId, ShippingDetails};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    memory::DEFAULT_LOCK_TIMEOUT,
    store::{CartRow, Store, UnitOfWork},
};

/// SQLSTATE for `lock_not_available`, raised when `lock_timeout` expires.
const LOCK_NOT_AVAILABLE: &str = "55P03";

/// SQLSTATE for `deadlock_detected`.
const DEADLOCK_DETECTED: &str = "40P01";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store with the default lock timeout.
    pub fn new(pool: PgPool) -> Self {
        Self::with_lock_timeout(pool, DEFAULT_LOCK_TIMEOUT)
    }

    /// Creates a new PostgreSQL store whose row locks give up after
    /// `lock_timeout`.
    pub fn with_lock_timeout(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    /// Removes a product from the catalog. Cart rows cascade.
    pub async fn remove_product(&self, product_id: &ProductId) -> Result<()> {
        sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(product_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Removes a user. Their cart rows cascade; their orders stay.
    pub async fn remove_user(&self, user_id: UserId) -> Result<()> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load_order_lines(&self, order_id: OrderId) -> Result<Vec<OrderLine>> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, product_name, product_description, unit_price_cents, quantity
            FROM order_lines
            WHERE order_id = $1
            ORDER BY line_no ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_order_line).collect()
    }
}

fn row_to_product(row: &PgRow) -> Result<Product> {
    let available: i32 = row.try_get("available_quantity")?;
    let available = u32::try_from(available).map_err(|_| StoreError::CorruptValue {
        column: "available_quantity",
        value: i64::from(available),
    })?;

    Ok(Product::new(
        row.try_get::<String, _>("id")?,
        row.try_get::<String, _>("name")?,
        row.try_get::<String, _>("description")?,
        Money::from_cents(row.try_get("price_cents")?),
        available,
    ))
}

fn row_to_cart_row(row: &PgRow) -> Result<CartRow> {
    let quantity: i32 = row.try_get("quantity")?;
    let quantity = u32::try_from(quantity).map_err(|_| StoreError::CorruptValue {
        column: "cart_items.quantity",
        value: i64::from(quantity),
    })?;
    Ok(CartRow::new(row.try_get::<String, _>("product_id")?, quantity))
}

fn row_to_order_line(row: &PgRow) -> Result<OrderLine> {
    let quantity: i32 = row.try_get("quantity")?;
    let quantity = u32::try_from(quantity).map_err(|_| StoreError::CorruptValue {
        column: "order_lines.quantity",
        value: i64::from(quantity),
    })?;

    Ok(OrderLine::new(
        row.try_get::<String, _>("product_id")?,
        row.try_get::<String, _>("product_name")?,
        row.try_get::<String, _>("product_description")?,
        Money::from_cents(row.try_get("unit_price_cents")?),
        quantity,
    ))
}

/// Maps lock-wait failures to [`StoreError::LockTimeout`].
fn map_lock_error(err: sqlx::Error, resource: impl FnOnce() -> String) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err
        && matches!(
            db_err.code().as_deref(),
            Some(LOCK_NOT_AVAILABLE) | Some(DEADLOCK_DETECTED)
        )
    {
        let resource = resource();
        metrics::counter!("store_lock_timeouts_total").increment(1);
        tracing::warn!(%resource, "row lock not available");
        return StoreError::LockTimeout { resource };
    }
    StoreError::Database(err)
}

fn to_db_quantity(quantity: u32, column: &'static str) -> Result<i32> {
    i32::try_from(quantity).map_err(|_| StoreError::CorruptValue {
        column,
        value: i64::from(quantity),
    })
}

async fn ensure_user<'e, E>(executor: E, user_id: UserId) -> Result<()>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query("INSERT INTO users (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
        .bind(user_id.as_uuid())
        .execute(executor)
        .await?;
    Ok(())
}

#[async_trait]
impl Store for PostgresStore {
    type Tx = PostgresUnitOfWork;

    async fn begin(&self) -> Result<PostgresUnitOfWork> {
        let mut tx = self.pool.begin().await?;

        let statement = format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis().max(1)
        );
        sqlx::query(&statement).execute(&mut *tx).await?;

        Ok(PostgresUnitOfWork { tx })
    }

    async fn find_product(&self, product_id: &ProductId) -> Result<Option<Product>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, name, description, price_cents, available_quantity
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_product).transpose()
    }

    async fn put_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, price_cents, available_quantity)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                price_cents = EXCLUDED.price_cents,
                available_quantity = EXCLUDED.available_quantity,
                updated_at = NOW()
            "#,
        )
        .bind(product.id.as_str())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.cents())
        .bind(to_db_quantity(product.available_quantity, "available_quantity")?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, user_id, status, total_cents, shipping, created_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: OrderStatus = row.try_get::<String, _>("status")?.parse()?;
        let shipping: ShippingDetails =
            serde_json::from_value(row.try_get::<serde_json::Value, _>("shipping")?)?;
        let stored_total: i64 = row.try_get("total_cents")?;

        let order = Order::from_parts(
            OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            row.try_get::<Option<Uuid>, _>("user_id")?
                .map(UserId::from_uuid),
            row.try_get("created_at")?,
            status,
            shipping,
            self.load_order_lines(order_id).await?,
        )?;

        if order.total_amount().cents() != stored_total {
            return Err(StoreError::CorruptValue {
                column: "total_cents",
                value: stored_total,
            });
        }

        Ok(Some(order))
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn count_orders(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn cart_rows(&self, user_id: UserId) -> Result<Vec<CartRow>> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, quantity
            FROM cart_items
            WHERE user_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_cart_row).collect()
    }

    async fn upsert_cart_row(&self, user_id: UserId, row: &CartRow) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        ensure_user(&mut *tx, user_id).await?;

        sqlx::query(
            r#"
            INSERT INTO cart_items (user_id, product_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, product_id) DO UPDATE SET
                quantity = EXCLUDED.quantity
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(row.product_id.as_str())
        .bind(to_db_quantity(row.quantity, "cart_items.quantity")?)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete_cart_row(&self, user_id: UserId, product_id: &ProductId) -> Result<()> {
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND product_id = $2")
            .bind(user_id.as_uuid())
            .bind(product_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear_cart_rows(&self, user_id: UserId) -> Result<()> {
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Unit of work backed by a PostgreSQL transaction.
///
/// Row locks are `SELECT ... FOR UPDATE` locks, bounded by the transaction's
/// `lock_timeout`. Dropping the unit of work rolls the transaction back.
pub struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn lock_cart(&mut self, user_id: UserId) -> Result<Vec<CartRow>> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, quantity
            FROM cart_items
            WHERE user_id = $1
            ORDER BY position ASC
            FOR UPDATE
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_lock_error(e, || format!("cart {user_id}")))?;

        rows.iter().map(row_to_cart_row).collect()
    }

    async fn lock_product(&mut self, product_id: &ProductId) -> Result<Option<Product>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, name, description, price_cents, available_quantity
            FROM products
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(product_id.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_lock_error(e, || format!("product {product_id}")))?;

        row.as_ref().map(row_to_product).transpose()
    }

    async fn decrement_stock(&mut self, product_id: &ProductId, amount: u32) -> Result<()> {
        // The guard in the WHERE clause keeps the ledger non-negative even for
        // callers that skipped lock_product.
        let result = sqlx::query(
            r#"
            UPDATE products
            SET available_quantity = available_quantity - $2, updated_at = NOW()
            WHERE id = $1 AND available_quantity >= $2
            "#,
        )
        .bind(product_id.as_str())
        .bind(i64::from(amount))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_lock_error(e, || format!("product {product_id}")))?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let available: Option<i32> =
            sqlx::query_scalar("SELECT available_quantity FROM products WHERE id = $1")
                .bind(product_id.as_str())
                .fetch_optional(&mut *self.tx)
                .await?;

        match available {
            None => Err(StoreError::ProductNotFound(product_id.clone())),
            Some(available) => Err(StoreError::StockUnderflow {
                product_id: product_id.clone(),
                available: u32::try_from(available).unwrap_or(0),
                requested: amount,
            }),
        }
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        if let Some(user_id) = order.user_id() {
            ensure_user(&mut *self.tx, user_id).await?;
        }

        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, status, total_cents, shipping, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.user_id().map(|id| id.as_uuid()))
        .bind(order.status().as_str())
        .bind(order.total_amount().cents())
        .bind(serde_json::to_value(order.shipping())?)
        .bind(order.created_at())
        .execute(&mut *self.tx)
        .await?;

        for (line_no, line) in order.lines().iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_lines (order_id, line_no, product_id, product_name,
                                         product_description, unit_price_cents, quantity)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(order.id().as_uuid())
            .bind(line_no as i32)
            .bind(line.product_id.as_str())
            .bind(&line.product_name)
            .bind(&line.description)
            .bind(line.unit_price.cents())
            .bind(to_db_quantity(line.quantity, "order_lines.quantity")?)
            .execute(&mut *self.tx)
            .await?;
        }

        tracing::debug!(order_id = %order.id(), lines = order.lines().len(), "order row staged");
        Ok(())
    }

    async fn clear_cart(&mut self, user_id: UserId) -> Result<()> {
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_lock_error(e, || format!("cart {user_id}")))?;
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
