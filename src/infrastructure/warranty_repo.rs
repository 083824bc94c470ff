use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use crate::db::DbPool;
use crate::domain::errors::DomainError;
use crate::domain::ports::WarrantyRepository;
use crate::domain::warranty::{WarrantyRegistration, WarrantyStatus};
use crate::domain::Page;
use crate::schema::{order_items, warranty_registrations};

use super::models::WarrantyRegistrationRow;

pub struct DieselWarrantyRepository {
    pool: DbPool,
}

impl DieselWarrantyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn to_domain(rows: Vec<WarrantyRegistrationRow>) -> Result<Vec<WarrantyRegistration>, DomainError> {
    rows.into_iter().map(WarrantyRegistration::try_from).collect()
}

impl WarrantyRepository for DieselWarrantyRepository {
    fn find_by_id(&self, id: Uuid) -> Result<Option<WarrantyRegistration>, DomainError> {
        let mut conn = self.pool.get()?;
        warranty_registrations::table
            .find(id)
            .select(WarrantyRegistrationRow::as_select())
            .first::<WarrantyRegistrationRow>(&mut conn)
            .optional()?
            .map(WarrantyRegistration::try_from)
            .transpose()
    }

    fn insert_if_absent(&self, registration: &WarrantyRegistration) -> Result<WarrantyRegistration, DomainError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            diesel::insert_into(warranty_registrations::table)
                .values(&WarrantyRegistrationRow::from(registration))
                .on_conflict(warranty_registrations::order_item_id)
                .do_nothing()
                .execute(conn)?;

            let stored = warranty_registrations::table
                .filter(warranty_registrations::order_item_id.eq(registration.order_item_id))
                .select(WarrantyRegistrationRow::as_select())
                .first::<WarrantyRegistrationRow>(conn)?;
            WarrantyRegistration::try_from(stored)
        })
    }

    fn claim(
        &self,
        id: Uuid,
        attempts: i32,
        stale_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<WarrantyRegistration>, DomainError> {
        use crate::schema::warranty_registrations::dsl as w;

        let mut conn = self.pool.get()?;
        let claimable = w::status.eq(WarrantyStatus::Failed.as_str()).or(w::status
            .eq(WarrantyStatus::Pending.as_str())
            .and(w::attempts.eq(0).or(w::updated_at.lt(stale_before))));
        diesel::update(
            w::warranty_registrations
                .find(id)
                .filter(w::attempts.eq(attempts))
                .filter(claimable),
        )
        .set((
            w::status.eq(WarrantyStatus::Pending.as_str()),
            w::attempts.eq(attempts + 1),
            w::updated_at.eq(now),
        ))
        .returning(WarrantyRegistrationRow::as_returning())
        .get_result::<WarrantyRegistrationRow>(&mut conn)
        .optional()?
        .map(WarrantyRegistration::try_from)
        .transpose()
    }

    fn save_attempt(
        &self,
        registration: &WarrantyRegistration,
        warranty_option: Option<&Value>,
    ) -> Result<bool, DomainError> {
        let mut conn = self.pool.get()?;
        conn.transaction::<_, DomainError, _>(|conn| {
            let updated = diesel::update(
                warranty_registrations::table
                    .find(registration.id)
                    .filter(warranty_registrations::status.ne(WarrantyStatus::Cancelled.as_str()))
                    .filter(warranty_registrations::attempts.eq(registration.attempts)),
            )
            .set(&WarrantyRegistrationRow::from(registration))
            .execute(conn)?;
            if updated == 0 {
                return Ok(false);
            }
            if let Some(option) = warranty_option {
                diesel::update(order_items::table.find(registration.order_item_id))
                    .set(order_items::warranty_option.eq(Some(option)))
                    .execute(conn)?;
            }
            Ok(true)
        })
    }

    fn list_needing_attention(
        &self,
        stale_before: DateTime<Utc>,
        page: i64,
        limit: i64,
    ) -> Result<Page<WarrantyRegistration>, DomainError> {
        use crate::schema::warranty_registrations::dsl as w;

        let mut conn = self.pool.get()?;
        let needs_attention = || {
            w::status.eq(WarrantyStatus::Failed.as_str()).or(w::status
                .eq(WarrantyStatus::Pending.as_str())
                .and(w::updated_at.lt(stale_before)))
        };

        let offset = page.saturating_sub(1).saturating_mul(limit);
        conn.transaction::<_, DomainError, _>(|conn| {
            let total: i64 = w::warranty_registrations
                .filter(needs_attention())
                .count()
                .get_result(conn)?;

            let rows = w::warranty_registrations
                .filter(needs_attention())
                .order(w::updated_at.desc())
                .limit(limit)
                .offset(offset)
                .select(WarrantyRegistrationRow::as_select())
                .load::<WarrantyRegistrationRow>(conn)?;

            Ok(Page {
                items: to_domain(rows)?,
                total,
            })
        })
    }

    fn list_for_order(&self, order_id: Uuid) -> Result<Vec<WarrantyRegistration>, DomainError> {
        let mut conn = self.pool.get()?;
        let rows = warranty_registrations::table
            .filter(warranty_registrations::order_id.eq(order_id))
            .order(warranty_registrations::created_at.asc())
            .select(WarrantyRegistrationRow::as_select())
            .load::<WarrantyRegistrationRow>(&mut conn)?;
        to_domain(rows)
    }

    fn cancel_for_order(&self, order_id: Uuid, now: DateTime<Utc>) -> Result<usize, DomainError> {
        let mut conn = self.pool.get()?;
        let cancelled = diesel::update(
            warranty_registrations::table
                .filter(warranty_registrations::order_id.eq(order_id))
                .filter(warranty_registrations::status.ne(WarrantyStatus::Cancelled.as_str())),
        )
        .set((
            warranty_registrations::status.eq(WarrantyStatus::Cancelled.as_str()),
            warranty_registrations::updated_at.eq(now),
        ))
        .execute(&mut conn)?;
        Ok(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::DieselWarrantyRepository;
    use crate::domain::ports::{OrderRepository, WarrantyRepository};
    use crate::domain::warranty::{
        enrich_warranty_option, stale_before, WarrantyConfirmation, WarrantyRegistration, WarrantyStatus,
        STALE_ATTEMPT_MINUTES,
    };
    use crate::infrastructure::order_repo::tests::sample_order;
    use crate::infrastructure::order_repo::DieselOrderRepository;
    use crate::infrastructure::test_db::setup_db;

    #[tokio::test]
    #[ignore = "requires a container runtime"]
    async fn one_registration_per_item_and_attempts_persist() {
        let (_container, pool) = setup_db().await;
        let orders = DieselOrderRepository::new(pool.clone());
        let repo = DieselWarrantyRepository::new(pool.clone());
        let order = sample_order(&pool, None, true);
        orders.create(&order).expect("create order failed");
        let item = &order.items[0];

        let first = WarrantyRegistration::pending(&order, item, "G3-2Y".to_string(), Utc::now());
        let stored = repo.insert_if_absent(&first).expect("insert failed");
        assert_eq!(stored.id, first.id);

        let second = WarrantyRegistration::pending(&order, item, "G3-2Y".to_string(), Utc::now());
        let stored = repo.insert_if_absent(&second).expect("insert failed");
        assert_eq!(stored.id, first.id, "existing registration is returned");

        let mut failed = repo
            .claim(stored.id, 0, stale_before(Utc::now()), Utc::now())
            .expect("claim failed")
            .expect("fresh row is claimable");
        assert_eq!(failed.attempts, 1);
        assert!(
            repo.claim(stored.id, 0, stale_before(Utc::now()), Utc::now())
                .expect("claim failed")
                .is_none(),
            "a row is claimed once per attempt"
        );
        failed.status = WarrantyStatus::Failed;
        failed.error_code = Some("HTTP_503".to_string());
        assert!(repo.save_attempt(&failed, None).expect("save failed"));
        let page = repo
            .list_needing_attention(stale_before(Utc::now()), 1, 20)
            .expect("list failed");
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].error_code.as_deref(), Some("HTTP_503"));

        let now = Utc::now();
        let confirmation = WarrantyConfirmation {
            transaction_id: "G3TX-1".to_string(),
            pin: "424242".to_string(),
        };
        let mut registered = repo
            .claim(failed.id, 1, stale_before(Utc::now()), Utc::now())
            .expect("claim failed")
            .expect("failed row is claimable");
        assert_eq!(registered.attempts, 2);
        registered.status = WarrantyStatus::Registered;
        registered.error_code = None;
        registered.transaction_id = Some(confirmation.transaction_id.clone());
        registered.pin = Some(confirmation.pin.clone());
        let option = enrich_warranty_option(item.warranty_option.as_ref().unwrap(), &confirmation, now);
        assert!(repo.save_attempt(&registered, Some(&option)).expect("save failed"));

        let reloaded = orders.find_by_id(order.id).expect("find failed").expect("exists");
        assert_eq!(
            reloaded.items[0].warranty_option.as_ref().unwrap()["contract_number"],
            "G3TX-1"
        );
        let regs = repo.list_for_order(order.id).expect("list failed");
        assert_eq!(regs[0].status, WarrantyStatus::Registered);
        assert!(regs[0].error_code.is_none());

        assert_eq!(repo.cancel_for_order(order.id, Utc::now()).expect("cancel failed"), 1);
        assert_eq!(repo.cancel_for_order(order.id, Utc::now()).expect("cancel failed"), 0);
    }

    #[tokio::test]
    #[ignore = "requires a container runtime"]
    async fn cancellation_is_not_overwritten_by_a_late_attempt() {
        let (_container, pool) = setup_db().await;
        let orders = DieselOrderRepository::new(pool.clone());
        let repo = DieselWarrantyRepository::new(pool.clone());
        let order = sample_order(&pool, None, true);
        orders.create(&order).expect("create order failed");
        let item = &order.items[0];

        let pending = WarrantyRegistration::pending(&order, item, "G3-2Y".to_string(), Utc::now());
        repo.insert_if_absent(&pending).expect("insert failed");
        let mut claimed = repo
            .claim(pending.id, 0, stale_before(Utc::now()), Utc::now())
            .expect("claim failed")
            .expect("fresh row is claimable");

        // In flight: neither claimable again nor listed as stuck.
        assert!(repo
            .claim(pending.id, 1, stale_before(Utc::now()), Utc::now())
            .expect("claim failed")
            .is_none());
        assert_eq!(
            repo.list_needing_attention(stale_before(Utc::now()), 1, 20)
                .expect("list failed")
                .total,
            0
        );
        let later = Utc::now() + Duration::minutes(STALE_ATTEMPT_MINUTES + 1);
        assert_eq!(
            repo.list_needing_attention(stale_before(later), 1, 20)
                .expect("list failed")
                .total,
            1
        );

        assert_eq!(repo.cancel_for_order(order.id, Utc::now()).expect("cancel failed"), 1);
        claimed.status = WarrantyStatus::Registered;
        claimed.transaction_id = Some("G3TX-LATE".to_string());
        assert!(!repo.save_attempt(&claimed, None).expect("save failed"));

        let stored = repo.find_by_id(pending.id).expect("find failed").expect("exists");
        assert_eq!(stored.status, WarrantyStatus::Cancelled);
        assert!(stored.transaction_id.is_none());

        let huge = repo
            .list_needing_attention(stale_before(later), i64::MAX, 100)
            .expect("list failed");
        assert!(huge.items.is_empty());
    }
}
