use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::json;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::order::{Order, OrderChange, OrderItem, OrderStatus};
use crate::domain::ports::OrderRepository;
use crate::domain::Page;
use crate::schema::{order_items, orders};

use super::models::{OrderItemRow, OrderRow};
use super::outbox::{self, ORDER_AGGREGATE};

// ── Error conversions (infrastructure concern only) ──────────────────────────

impl From<diesel::result::Error> for DomainError {
    fn from(e: diesel::result::Error) -> Self {
        DomainError::Internal(e.to_string())
    }
}

impl From<r2d2::Error> for DomainError {
    fn from(e: r2d2::Error) -> Self {
        DomainError::Internal(e.to_string())
    }
}

// ── Shared loaders ───────────────────────────────────────────────────────────

fn with_items(conn: &mut PgConnection, row: OrderRow) -> Result<Order, DomainError> {
    let items = order_items::table
        .filter(order_items::order_id.eq(row.id))
        .order(order_items::created_at.asc())
        .select(OrderItemRow::as_select())
        .load::<OrderItemRow>(conn)?
        .into_iter()
        .map(OrderItem::from)
        .collect();
    row.into_domain(items)
}

pub(crate) fn load_order(conn: &mut PgConnection, id: Uuid) -> Result<Option<Order>, DomainError> {
    let row = orders::table
        .find(id)
        .select(OrderRow::as_select())
        .first(conn)
        .optional()?;
    row.map(|row| with_items(conn, row)).transpose()
}

/// Loads an order holding its row lock until the surrounding transaction
/// ends.
pub(crate) fn lock_order(conn: &mut PgConnection, id: Uuid) -> Result<Order, DomainError> {
    let row = orders::table
        .find(id)
        .select(OrderRow::as_select())
        .for_update()
        .get_result(conn)
        .optional()?
        .ok_or_else(|| DomainError::not_found("Order"))?;
    with_items(conn, row)
}

/// Writes back the order header; items are immutable after checkout.
pub(crate) fn save_order(conn: &mut PgConnection, order: &Order) -> QueryResult<usize> {
    diesel::update(orders::table.find(order.id))
        .set(&OrderRow::from(order))
        .execute(conn)
}

pub(crate) fn order_status_event(order: &Order) -> serde_json::Value {
    json!({
        "order_id": order.id,
        "order_number": order.order_number,
        "status": order.status.as_str(),
        "payment_status": order.payment_status.as_str(),
        "shipping_status": order.shipping_status.as_str(),
        "tracking_number": order.tracking_number,
    })
}

fn headers(rows: Vec<OrderRow>) -> Result<Vec<Order>, DomainError> {
    rows.into_iter().map(|r| r.into_domain(vec![])).collect()
}

// ── Repository ────────────────────────────────────────────────────────────────

pub struct DieselOrderRepository {
    pool: DbPool,
}

impl DieselOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl OrderRepository for DieselOrderRepository {
    fn create(&self, order: &Order) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            diesel::insert_into(orders::table)
                .values(&OrderRow::from(order))
                .execute(conn)?;

            let items: Vec<OrderItemRow> = order.items.iter().map(OrderItemRow::from).collect();
            diesel::insert_into(order_items::table)
                .values(&items)
                .execute(conn)?;

            let item_payloads: Vec<serde_json::Value> = order
                .items
                .iter()
                .map(|i| {
                    json!({
                        "product_id": i.product_id,
                        "sku": i.sku,
                        "quantity": i.quantity,
                        "unit_price": i.unit_price.to_string(),
                        "line_total": i.line_total.to_string(),
                        "has_warranty": i.warranty_option.is_some(),
                    })
                })
                .collect();
            outbox::record(
                conn,
                ORDER_AGGREGATE,
                order.id,
                "OrderCreated",
                json!({
                    "order_id": order.id,
                    "order_number": order.order_number,
                    "user_id": order.user_id,
                    "status": order.status.as_str(),
                    "total": order.total.to_string(),
                    "currency": order.currency,
                    "items": item_payloads,
                }),
            )?;
            Ok(())
        })
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DomainError> {
        let mut conn = self.pool.get()?;
        load_order(&mut conn, id)
    }

    fn list(&self, status: Option<OrderStatus>, page: i64, limit: i64) -> Result<Page<Order>, DomainError> {
        let mut conn = self.pool.get()?;

        let offset = page.saturating_sub(1).saturating_mul(limit);
        conn.transaction::<_, DomainError, _>(|conn| {
            let total: i64 = match status {
                Some(s) => orders::table
                    .filter(orders::status.eq(s.as_str()))
                    .count()
                    .get_result(conn)?,
                None => orders::table.count().get_result(conn)?,
            };

            let mut query = orders::table
                .select(OrderRow::as_select())
                .order(orders::created_at.desc())
                .limit(limit)
                .offset(offset)
                .into_boxed();
            if let Some(s) = status {
                query = query.filter(orders::status.eq(s.as_str()));
            }
            let rows = query.load(conn)?;

            Ok(Page {
                items: headers(rows)?,
                total,
            })
        })
    }

    fn list_for_user(&self, user_id: Uuid, page: i64, limit: i64) -> Result<Page<Order>, DomainError> {
        let mut conn = self.pool.get()?;

        let offset = page.saturating_sub(1).saturating_mul(limit);
        conn.transaction::<_, DomainError, _>(|conn| {
            let total: i64 = orders::table
                .filter(orders::user_id.eq(user_id))
                .count()
                .get_result(conn)?;

            let rows = orders::table
                .filter(orders::user_id.eq(user_id))
                .select(OrderRow::as_select())
                .order(orders::created_at.desc())
                .limit(limit)
                .offset(offset)
                .load(conn)?;

            Ok(Page {
                items: headers(rows)?,
                total,
            })
        })
    }

    fn update(&self, id: Uuid, change: &OrderChange, now: DateTime<Utc>) -> Result<Order, DomainError> {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            let mut order = lock_order(conn, id)?;
            if order.apply_change(change, now)? {
                save_order(conn, &order)?;
                outbox::record(
                    conn,
                    ORDER_AGGREGATE,
                    order.id,
                    "OrderStatusChanged",
                    order_status_event(&order),
                )?;
            }
            Ok(order)
        })
    }
}
