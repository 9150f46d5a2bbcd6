use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CartLineId, CustomerId, OrderId, OrderLineId, ProductId, ReservationId};
use domain::{
    CartLine, CartLineWithProduct, Money, OrderHeader, OrderLine, OrderStatus, Product,
    ProductSnapshot, ShippingAddress,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgPoolOptions, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{CartStore, OrderStore, StockLedger, StockLevel, StoredOrder},
};

/// PostgreSQL-backed record store implementation.
///
/// Stock reservations, releases and order inserts each run in their own
/// transaction. With a statement timeout set, the server aborts a slow
/// write and rolls it back, so a bounded write never lands after its
/// caller gave up.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    statement_timeout: Option<Duration>,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            statement_timeout: None,
        }
    }

    /// Bounds every statement of the store's write transactions on the
    /// server side.
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    /// Connects a pool to `database_url` and wraps it.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Inserts or replaces a catalog product.
    pub async fn upsert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, unit_price_cents, stock, is_active)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                unit_price_cents = EXCLUDED.unit_price_cents,
                stock = EXCLUDED.stock,
                is_active = EXCLUDED.is_active
            "#,
        )
        .bind(product.id.as_str())
        .bind(&product.name)
        .bind(product.unit_price.cents())
        .bind(to_db_int(product.stock_quantity)?)
        .bind(product.is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        if let Some(timeout) = self.statement_timeout {
            // SET takes no bind parameters; the value is a formatted integer.
            let sql = format!("SET LOCAL statement_timeout = {}", timeout.as_millis().max(1));
            sqlx::query(&sql).execute(&mut *tx).await?;
        }
        Ok(tx)
    }

    /// Explains why a conditional decrement matched no row.
    async fn reservation_failure(&self, product_id: &ProductId, requested: u32) -> StoreError {
        let stock: std::result::Result<Option<i32>, sqlx::Error> =
            sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
                .bind(product_id.as_str())
                .fetch_optional(&self.pool)
                .await;

        match stock {
            Ok(Some(stock)) => match from_db_int(stock, "products.stock") {
                Ok(available) => StoreError::InsufficientStock {
                    product_id: product_id.clone(),
                    requested,
                    available,
                },
                Err(e) => e,
            },
            Ok(None) => StoreError::ProductNotFound(product_id.clone()),
            Err(e) => StoreError::Database(e),
        }
    }

    fn row_to_cart_line(row: &PgRow) -> Result<CartLine> {
        Ok(CartLine {
            id: CartLineId::from_uuid(row.try_get::<Uuid, _>("id")?),
            customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            quantity: from_db_int(row.try_get("quantity")?, "cart_items.quantity")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_header(row: &PgRow) -> Result<OrderHeader> {
        let address: String = row.try_get("shipping_address")?;
        let status: String = row.try_get("status")?;

        Ok(OrderHeader {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
            total_amount: Money::from_cents(row.try_get("total_amount_cents")?),
            shipping_address: ShippingAddress::parse(Some(&address))
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            status: status.parse::<OrderStatus>().map_err(StoreError::Corrupt)?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_order_line(row: &PgRow) -> Result<OrderLine> {
        Ok(OrderLine {
            id: OrderLineId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            quantity: from_db_int(row.try_get("quantity")?, "order_items.quantity")?,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
            line_total: Money::from_cents(row.try_get("line_total_cents")?),
        })
    }
}

fn duplicate_reservation(err: sqlx::Error, reservation_id: ReservationId) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::DuplicateReservation(reservation_id)
        }
        _ => StoreError::Database(err),
    }
}

fn to_db_int(value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{value} exceeds INTEGER range")))
}

fn from_db_int(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {column}: {value}")))
}

#[async_trait]
impl StockLedger for PostgresStore {
    async fn read_stock(&self, product_ids: &[ProductId]) -> Result<Vec<StockLevel>> {
        let ids: Vec<String> = product_ids.iter().map(|id| id.as_str().to_string()).collect();

        let rows = sqlx::query("SELECT id, stock, is_active FROM products WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<StockLevel> {
                Ok(StockLevel {
                    product_id: ProductId::new(row.try_get::<String, _>("id")?),
                    stock_quantity: from_db_int(row.try_get("stock")?, "products.stock")?,
                    is_active: row.try_get("is_active")?,
                })
            })
            .collect()
    }

    async fn try_reserve(
        &self,
        reservation_id: ReservationId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<u32> {
        // A request beyond INTEGER range can never be satisfied.
        let Ok(requested) = i32::try_from(quantity) else {
            return Err(self.reservation_failure(product_id, quantity).await);
        };

        let mut tx = self.begin().await?;

        // Check, decrement and journal in one statement. The row lock taken
        // by UPDATE serializes concurrent reservations of the same product.
        let new_stock: Option<i32> = sqlx::query_scalar(
            r#"
            WITH taken AS (
                UPDATE products
                SET stock = stock - $3
                WHERE id = $2 AND stock >= $3
                RETURNING id, stock
            ), journal AS (
                INSERT INTO stock_reservations (id, product_id, quantity)
                SELECT $1, id, $3 FROM taken
            )
            SELECT stock FROM taken
            "#,
        )
        .bind(reservation_id.as_uuid())
        .bind(product_id.as_str())
        .bind(requested)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| duplicate_reservation(e, reservation_id))?;

        match new_stock {
            Some(stock) => {
                tx.commit().await?;
                from_db_int(stock, "products.stock")
            }
            None => {
                tx.rollback().await?;
                Err(self.reservation_failure(product_id, quantity).await)
            }
        }
    }

    async fn release(
        &self,
        reservation_id: ReservationId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<u32> {
        let mut tx = self.begin().await?;

        // Claim the id first. If a reservation with this id is still in
        // flight, this waits for it; if it never happened, the claim makes
        // any late attempt fail on the primary key.
        let claimed = sqlx::query(
            r#"
            INSERT INTO stock_reservations (id, product_id, quantity, state)
            VALUES ($1, $2, $3, 'released')
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(reservation_id.as_uuid())
        .bind(product_id.as_str())
        .bind(to_db_int(quantity)?)
        .execute(&mut *tx)
        .await?;
        if claimed.rows_affected() == 1 {
            tx.commit().await?;
            return Ok(0);
        }

        let held: Option<(String, i32)> = sqlx::query_as(
            r#"
            UPDATE stock_reservations
            SET state = 'released'
            WHERE id = $1 AND state = 'held'
            RETURNING product_id, quantity
            "#,
        )
        .bind(reservation_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;

        let Some((held_product, held_quantity)) = held else {
            tx.commit().await?;
            return Ok(0);
        };

        let restored = sqlx::query("UPDATE products SET stock = stock + $2 WHERE id = $1")
            .bind(&held_product)
            .bind(held_quantity)
            .execute(&mut *tx)
            .await?;
        if restored.rows_affected() == 0 {
            return Err(StoreError::ProductNotFound(ProductId::new(held_product)));
        }

        tx.commit().await?;
        from_db_int(held_quantity, "stock_reservations.quantity")
    }
}

#[async_trait]
impl CartStore for PostgresStore {
    async fn cart_with_products(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<CartLineWithProduct>> {
        // One statement, so the join is a single consistent view.
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.customer_id, c.product_id, c.quantity, c.created_at, c.updated_at,
                   p.name, p.unit_price_cents, p.stock, p.is_active
            FROM cart_items c
            LEFT JOIN products p ON p.id = c.product_id
            WHERE c.customer_id = $1
            ORDER BY c.created_at DESC, c.id ASC
            "#,
        )
        .bind(customer_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<CartLineWithProduct> {
                let line = Self::row_to_cart_line(row)?;
                let product = match row.try_get::<Option<String>, _>("name")? {
                    Some(name) => Some(ProductSnapshot {
                        name,
                        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
                        stock_quantity: from_db_int(row.try_get("stock")?, "products.stock")?,
                        is_active: row.try_get("is_active")?,
                    }),
                    None => None,
                };
                Ok(CartLineWithProduct { line, product })
            })
            .collect()
    }

    async fn get_line(&self, line_id: CartLineId) -> Result<Option<CartLine>> {
        let row = sqlx::query(
            r#"
            SELECT id, customer_id, product_id, quantity, created_at, updated_at
            FROM cart_items
            WHERE id = $1
            "#,
        )
        .bind(line_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_cart_line).transpose()
    }

    async fn find_line(
        &self,
        customer_id: CustomerId,
        product_id: &ProductId,
    ) -> Result<Option<CartLine>> {
        let row = sqlx::query(
            r#"
            SELECT id, customer_id, product_id, quantity, created_at, updated_at
            FROM cart_items
            WHERE customer_id = $1 AND product_id = $2
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(customer_id.as_uuid())
        .bind(product_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_cart_line).transpose()
    }

    async fn insert_line(&self, line: &CartLine) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cart_items (id, customer_id, product_id, quantity, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(line.id.as_uuid())
        .bind(line.customer_id.as_uuid())
        .bind(line.product_id.as_str())
        .bind(to_db_int(line.quantity)?)
        .bind(line.created_at)
        .bind(line.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_quantity(
        &self,
        line_id: CartLineId,
        quantity: u32,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result =
            sqlx::query("UPDATE cart_items SET quantity = $2, updated_at = $3 WHERE id = $1")
                .bind(line_id.as_uuid())
                .bind(to_db_int(quantity)?)
                .bind(updated_at)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_line(&self, line_id: CartLineId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = $1")
            .bind(line_id.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_lines(&self, customer_id: CustomerId, line_ids: &[CartLineId]) -> Result<u64> {
        let ids: Vec<Uuid> = line_ids.iter().map(CartLineId::as_uuid).collect();

        let result = sqlx::query("DELETE FROM cart_items WHERE customer_id = $1 AND id = ANY($2)")
            .bind(customer_id.as_uuid())
            .bind(ids)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_all(&self, customer_id: CustomerId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cart_items WHERE customer_id = $1")
            .bind(customer_id.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn insert_order(
        &self,
        order: &StoredOrder,
        reservations: &[ReservationId],
    ) -> Result<()> {
        let header = &order.header;
        let mut tx = self.begin().await?;

        if !reservations.is_empty() {
            let ids: Vec<Uuid> = reservations.iter().map(ReservationId::as_uuid).collect();
            let confirmed: Vec<Uuid> = sqlx::query_scalar(
                r#"
                UPDATE stock_reservations
                SET state = 'confirmed'
                WHERE id = ANY($1) AND state = 'held'
                RETURNING id
                "#,
            )
            .bind(ids)
            .fetch_all(&mut *tx)
            .await?;

            if let Some(lapsed) = reservations
                .iter()
                .find(|id| !confirmed.contains(&id.as_uuid()))
            {
                return Err(StoreError::ReservationNotHeld(*lapsed));
            }
        }

        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, total_amount_cents, shipping_address, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(header.id.as_uuid())
        .bind(header.customer_id.as_uuid())
        .bind(header.total_amount.cents())
        .bind(header.shipping_address.as_str())
        .bind(header.status.as_str())
        .bind(header.created_at)
        .execute(&mut *tx)
        .await?;

        for (position, line) in order.lines.iter().enumerate() {
            let position = i32::try_from(position)
                .map_err(|_| StoreError::Corrupt("too many order lines".to_string()))?;

            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, position, product_id, quantity, unit_price_cents, line_total_cents)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(line.id.as_uuid())
            .bind(line.order_id.as_uuid())
            .bind(position)
            .bind(line.product_id.as_str())
            .bind(to_db_int(line.quantity)?)
            .bind(line.unit_price.cents())
            .bind(line.line_total.cents())
            .execute(&mut *tx)
            .await?;
        }

        // Dropping the transaction on any early return rolls everything back.
        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<StoredOrder>> {
        let header = sqlx::query(
            r#"
            SELECT id, customer_id, total_amount_cents, shipping_address, status, created_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        let Some(header) = header else {
            return Ok(None);
        };

        let lines = sqlx::query(
            r#"
            SELECT id, order_id, product_id, quantity, unit_price_cents, line_total_cents
            FROM order_items
            WHERE order_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(StoredOrder {
            header: Self::row_to_header(&header)?,
            lines: lines
                .iter()
                .map(Self::row_to_order_line)
                .collect::<Result<_>>()?,
        }))
    }

    async fn orders_for_customer(&self, customer_id: CustomerId) -> Result<Vec<OrderHeader>> {
        let rows = sqlx::query(
            r#"
            SELECT id, customer_id, total_amount_cents, shipping_address, status, created_at
            FROM orders
            WHERE customer_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(customer_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_header).collect()
    }
}
