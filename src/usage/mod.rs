//! Usage Accountant: per-organisation daily page budget, enforced with an
//! atomic increment-then-check so two workers racing on the same org never
//! both slip under the limit.
//!
//! Keyed by `(organisation_id, utc_date)` in a `DashMap`, the same registry
//! shape the rate limiter uses for per-domain buckets, just applied to a
//! different key and counting instead of token-bucketing.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::Plan;

#[derive(Default)]
struct DayCounter(AtomicU32);

pub struct UsageAccountant {
    counters: DashMap<(Uuid, chrono::NaiveDate), Arc<DayCounter>>,
    plans: DashMap<Uuid, Plan>,
}

impl Default for UsageAccountant {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageAccountant {
    #[must_use]
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
            plans: DashMap::new(),
        }
    }

    /// Assign a non-default plan to an organisation. Orgs with no entry
    /// here are billed against [`Plan::free`].
    pub fn set_plan(&self, organisation_id: Uuid, plan: Plan) {
        self.plans.insert(organisation_id, plan);
    }

    fn limit_for(&self, organisation_id: Uuid) -> u32 {
        self.plans
            .get(&organisation_id)
            .map(|p| p.daily_page_limit)
            .unwrap_or_else(|| Plan::free().daily_page_limit)
    }

    /// Atomically increment today's counter for `organisation_id`. Returns
    /// `true` if the increment keeps the organisation within budget; if it
    /// would exceed the limit, the increment is rolled back and `false` is
    /// returned.
    pub fn try_consume(&self, organisation_id: Uuid) -> bool {
        let limit = self.limit_for(organisation_id);
        let today = Utc::now().date_naive();
        let counter = Arc::clone(
            self.counters
                .entry((organisation_id, today))
                .or_insert_with(|| Arc::new(DayCounter::default()))
                .value(),
        );

        let mut current = counter.0.load(Ordering::Relaxed);
        loop {
            if current >= limit {
                return false;
            }
            match counter.0.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    #[must_use]
    pub fn today_usage(&self, organisation_id: Uuid) -> u32 {
        let today = Utc::now().date_naive();
        self.counters
            .get(&(organisation_id, today))
            .map(|c| c.0.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}
