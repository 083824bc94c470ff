use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::json;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::order::Order;
use crate::domain::payment::{
    apply_refund, apply_status_change, Payment, ProviderKind, StatusChange, Transition,
};
use crate::domain::ports::PaymentRepository;
use crate::schema::payments;

use super::models::PaymentRow;
use super::order_repo::{lock_order, save_order};
use super::outbox::{self, PAYMENT_AGGREGATE};

pub struct DieselPaymentRepository {
    pool: DbPool,
}

impl DieselPaymentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl PaymentRepository for DieselPaymentRepository {
    fn create(&self, payment: &Payment) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;
        diesel::insert_into(payments::table)
            .values(&PaymentRow::from(payment))
            .execute(&mut conn)?;
        Ok(())
    }

    fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>, DomainError> {
        let mut conn = self.pool.get()?;
        payments::table
            .find(id)
            .select(PaymentRow::as_select())
            .first::<PaymentRow>(&mut conn)
            .optional()?
            .map(Payment::try_from)
            .transpose()
    }

    fn find_by_provider_ref(
        &self,
        provider: ProviderKind,
        provider_payment_id: &str,
    ) -> Result<Option<Payment>, DomainError> {
        let mut conn = self.pool.get()?;
        payments::table
            .filter(payments::provider.eq(provider.as_str()))
            .filter(payments::provider_payment_id.eq(provider_payment_id))
            .select(PaymentRow::as_select())
            .first::<PaymentRow>(&mut conn)
            .optional()?
            .map(Payment::try_from)
            .transpose()
    }

    fn list_for_order(&self, order_id: Uuid) -> Result<Vec<Payment>, DomainError> {
        let mut conn = self.pool.get()?;
        payments::table
            .filter(payments::order_id.eq(order_id))
            .order(payments::created_at.asc())
            .select(PaymentRow::as_select())
            .load::<PaymentRow>(&mut conn)?
            .into_iter()
            .map(Payment::try_from)
            .collect()
    }

    fn attach_provider_reference(
        &self,
        id: Uuid,
        provider_payment_id: &str,
        payment_url: Option<&str>,
    ) -> Result<(), DomainError> {
        let mut conn = self.pool.get()?;
        let updated = diesel::update(payments::table.find(id))
            .set((
                payments::provider_payment_id.eq(provider_payment_id),
                payments::payment_url.eq(payment_url),
                payments::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;
        if updated == 0 {
            return Err(DomainError::not_found("Payment"));
        }
        Ok(())
    }

    fn apply_status_change(
        &self,
        payment_id: Uuid,
        change: &StatusChange,
        now: DateTime<Utc>,
    ) -> Result<(Transition, Payment, Order), DomainError> {
        self.with_locked(payment_id, |payment, order| {
            Ok(apply_status_change(payment, order, change, now))
        })
    }

    fn record_refund(
        &self,
        payment_id: Uuid,
        amount: &BigDecimal,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(Transition, Payment, Order), DomainError> {
        self.with_locked(payment_id, |payment, order| {
            apply_refund(payment, order, amount, reason, now)
        })
    }
}

impl DieselPaymentRepository {
    /// Locks the payment and its order, lets `step` move them and writes
    /// both back, with an outbox event, when the step applied a transition.
    fn with_locked<F>(&self, payment_id: Uuid, step: F) -> Result<(Transition, Payment, Order), DomainError>
    where
        F: FnOnce(&mut Payment, &mut Order) -> Result<Transition, DomainError>,
    {
        let mut conn = self.pool.get()?;

        conn.transaction::<_, DomainError, _>(|conn| {
            // Lock order: payment first, then its order.
            let row = payments::table
                .find(payment_id)
                .select(PaymentRow::as_select())
                .for_update()
                .get_result::<PaymentRow>(conn)
                .optional()?
                .ok_or_else(|| DomainError::not_found("Payment"))?;
            let mut payment = Payment::try_from(row)?;
            let mut order = lock_order(conn, payment.order_id)?;

            let transition = step(&mut payment, &mut order)?;
            if let Transition::Applied { from, to } = transition {
                diesel::update(payments::table.find(payment.id))
                    .set(&PaymentRow::from(&payment))
                    .execute(conn)?;
                save_order(conn, &order)?;
                outbox::record(
                    conn,
                    PAYMENT_AGGREGATE,
                    payment.id,
                    "PaymentStatusChanged",
                    json!({
                        "payment_id": payment.id,
                        "order_id": order.id,
                        "provider": payment.provider.as_str(),
                        "from": from.as_str(),
                        "to": to.as_str(),
                        "amount": payment.amount.to_string(),
                        "refunded_amount": payment.refunded_amount.to_string(),
                        "order_status": order.status.as_str(),
                        "order_payment_status": order.payment_status.as_str(),
                    }),
                )?;
            }
            Ok((transition, payment, order))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bigdecimal::BigDecimal;
    use chrono::Utc;
    use diesel::prelude::*;

    use super::DieselPaymentRepository;
    use crate::domain::order::{OrderPaymentStatus, OrderStatus};
    use crate::domain::payment::{Payment, PaymentStatus, ProviderKind, StatusChange, Transition};
    use crate::domain::ports::{OrderRepository, PaymentRepository};
    use crate::infrastructure::order_repo::tests::sample_order;
    use crate::infrastructure::order_repo::DieselOrderRepository;
    use crate::infrastructure::test_db::setup_db;
    use crate::schema::commerce_order_outbox;

    #[tokio::test]
    #[ignore = "requires a container runtime"]
    async fn status_change_updates_payment_and_order_together() {
        let (_container, pool) = setup_db().await;
        let orders = DieselOrderRepository::new(pool.clone());
        let payments = DieselPaymentRepository::new(pool.clone());
        let order = sample_order(&pool, None, false);
        orders.create(&order).expect("create order failed");

        let payment = Payment::new_pending(&order, ProviderKind::Mock, Utc::now());
        payments.create(&payment).expect("create payment failed");
        payments
            .attach_provider_reference(payment.id, "mock_abc", Some("https://pay.example/abc"))
            .expect("attach failed");

        let found = payments
            .find_by_provider_ref(ProviderKind::Mock, "mock_abc")
            .expect("lookup failed")
            .expect("payment exists");
        assert_eq!(found.id, payment.id);
        assert!(payments
            .find_by_provider_ref(ProviderKind::Payplug, "mock_abc")
            .expect("lookup failed")
            .is_none());

        let (transition, payment, order) = payments
            .apply_status_change(payment.id, &StatusChange::to(PaymentStatus::Completed), Utc::now())
            .expect("apply failed");
        assert!(transition.completed_payment());
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.payment_status, OrderPaymentStatus::Paid);

        let stored = orders.find_by_id(order.id).expect("find failed").expect("exists");
        assert_eq!(stored.payment_status, OrderPaymentStatus::Paid);

        let (replay, _, _) = payments
            .apply_status_change(payment.id, &StatusChange::to(PaymentStatus::Completed), Utc::now())
            .expect("apply failed");
        assert_eq!(replay, Transition::Unchanged);

        let mut conn = pool.get().expect("Failed to get connection");
        let payment_events: i64 = commerce_order_outbox::table
            .filter(commerce_order_outbox::event_type.eq("PaymentStatusChanged"))
            .count()
            .get_result(&mut conn)
            .expect("count failed");
        assert_eq!(payment_events, 1);
    }

    #[tokio::test]
    #[ignore = "requires a container runtime"]
    async fn concurrent_webhooks_apply_once() {
        let (_container, pool) = setup_db().await;
        let orders = DieselOrderRepository::new(pool.clone());
        let payments = Arc::new(DieselPaymentRepository::new(pool.clone()));
        let order = sample_order(&pool, None, false);
        orders.create(&order).expect("create order failed");
        let payment = Payment::new_pending(&order, ProviderKind::Mock, Utc::now());
        payments.create(&payment).expect("create payment failed");

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let payments = Arc::clone(&payments);
                let id = payment.id;
                tokio::task::spawn_blocking(move || {
                    payments
                        .apply_status_change(id, &StatusChange::to(PaymentStatus::Completed), Utc::now())
                        .expect("apply failed")
                        .0
                })
            })
            .collect();

        let mut applied = 0;
        for handle in handles {
            if handle.await.expect("join failed").completed_payment() {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
    }

    #[tokio::test]
    #[ignore = "requires a container runtime"]
    async fn concurrent_refunds_add_up() {
        let (_container, pool) = setup_db().await;
        let orders = DieselOrderRepository::new(pool.clone());
        let payments = Arc::new(DieselPaymentRepository::new(pool.clone()));
        let order = sample_order(&pool, None, false);
        orders.create(&order).expect("create order failed");
        let payment = Payment::new_pending(&order, ProviderKind::Mock, Utc::now());
        payments.create(&payment).expect("create payment failed");
        payments
            .apply_status_change(payment.id, &StatusChange::to(PaymentStatus::Completed), Utc::now())
            .expect("apply failed");

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let payments = Arc::clone(&payments);
                let id = payment.id;
                tokio::task::spawn_blocking(move || {
                    payments
                        .record_refund(id, &BigDecimal::from(1), None, Utc::now())
                        .expect("refund failed")
                        .0
                })
            })
            .collect();
        for handle in handles {
            assert!(matches!(
                handle.await.expect("join failed"),
                Transition::Applied { .. }
            ));
        }

        let stored = payments.find_by_id(payment.id).expect("find failed").expect("exists");
        assert_eq!(stored.status, PaymentStatus::PartiallyRefunded);
        assert_eq!(stored.refunded_amount, BigDecimal::from(4));

        let too_much = &stored.amount + BigDecimal::from(1);
        assert!(payments.record_refund(payment.id, &too_much, None, Utc::now()).is_err());
    }
}
