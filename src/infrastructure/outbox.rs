use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use super::models::NewOutboxEventRow;
use crate::schema::commerce_order_outbox;

pub const ORDER_AGGREGATE: &str = "Order";
pub const PAYMENT_AGGREGATE: &str = "Payment";

/// Appends a domain event on the caller's connection so it commits or rolls
/// back together with the change it describes.
pub fn record(
    conn: &mut PgConnection,
    aggregate_type: &str,
    aggregate_id: Uuid,
    event_type: &str,
    payload: Value,
) -> QueryResult<()> {
    diesel::insert_into(commerce_order_outbox::table)
        .values(&NewOutboxEventRow {
            id: Uuid::new_v4(),
            aggregate_type: aggregate_type.to_string(),
            aggregate_id: aggregate_id.to_string(),
            event_type: event_type.to_string(),
            payload,
        })
        .execute(conn)?;
    Ok(())
}
