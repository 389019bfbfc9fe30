use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::prelude::*;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::{PatientIdentity, Schedule, SlotCategory};
use shared_store::{MemoryStore, PriceScope};

/// Rounding for monetary values: 2 decimal places, half-up.
const DECIMAL_PLACES: u32 = 2;

fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

fn to_money(value: Decimal) -> f64 {
    value
        .round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or_default()
}

/// Fee lookup walking doctor -> clinic -> department -> global; first
/// non-null wins. Returning `None` sends the caller to the fallback table.
#[async_trait]
pub trait PriceResolver: Send + Sync {
    async fn resolve(
        &self,
        category: SlotCategory,
        doctor_id: Option<Uuid>,
        clinic_id: Option<Uuid>,
        department_id: Option<Uuid>,
    ) -> Option<f64>;
}

/// Resolver over the scoped fee-override table in the durable store.
pub struct StorePriceResolver {
    store: Arc<MemoryStore>,
}

impl StorePriceResolver {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PriceResolver for StorePriceResolver {
    async fn resolve(
        &self,
        category: SlotCategory,
        doctor_id: Option<Uuid>,
        clinic_id: Option<Uuid>,
        department_id: Option<Uuid>,
    ) -> Option<f64> {
        if let Some(doctor_id) = doctor_id {
            if let Some(price) = self.store.price_rule(PriceScope::Doctor(doctor_id), category).await {
                return Some(price);
            }
        }
        if let Some(clinic_id) = clinic_id {
            if let Some(price) = self.store.price_rule(PriceScope::Clinic(clinic_id), category).await {
                return Some(price);
            }
        }
        if let Some(department_id) = department_id {
            if let Some(price) = self.store.price_rule(PriceScope::Department(department_id), category).await {
                return Some(price);
            }
        }
        self.store.price_rule(PriceScope::Global, category).await
    }
}

/// Listed fee when no override exists at any scope.
fn fallback_price(category: SlotCategory) -> f64 {
    match category {
        SlotCategory::Normal => 50.0,
        SlotCategory::Expert => 100.0,
        SlotCategory::Special => 300.0,
    }
}

pub struct PricingService {
    resolver: Arc<dyn PriceResolver>,
    config: AppConfig,
}

impl PricingService {
    pub fn new(resolver: Arc<dyn PriceResolver>, config: AppConfig) -> Self {
        Self { resolver, config }
    }

    /// Fee a patient pays for one session: resolved base fee times the
    /// identity multiplier, rounded half-up to cents.
    pub async fn consultation_fee(&self, schedule: &Schedule, identity: PatientIdentity) -> f64 {
        let base = self
            .resolver
            .resolve(
                schedule.category,
                Some(schedule.doctor_id),
                Some(schedule.clinic_id),
                Some(schedule.department_id),
            )
            .await
            .unwrap_or_else(|| fallback_price(schedule.category));

        let multiplier = self.discount_multiplier(identity);
        let fee = to_money(to_decimal(base) * to_decimal(multiplier));
        debug!(
            "resolved fee {:.2} for schedule {} ({:?}, multiplier {})",
            fee, schedule.schedule_id, schedule.category, multiplier
        );
        fee
    }

    /// Signed difference between two fees, in cents-exact arithmetic.
    pub fn price_diff(&self, new_fee: f64, old_fee: f64) -> f64 {
        to_money(to_decimal(new_fee) - to_decimal(old_fee))
    }

    fn discount_multiplier(&self, identity: PatientIdentity) -> f64 {
        match identity {
            PatientIdentity::Student => self.config.discount_student,
            PatientIdentity::Teacher => self.config.discount_teacher,
            PatientIdentity::Staff => self.config.discount_staff,
            PatientIdentity::Regular | PatientIdentity::External => 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use shared_models::{ScheduleStatus, TimeSection};

    fn schedule(category: SlotCategory) -> Schedule {
        Schedule {
            schedule_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            clinic_id: Uuid::new_v4(),
            department_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            time_section: TimeSection::Morning,
            category,
            total_slots: 10,
            remaining_slots: 10,
            price: 50.0,
            status: ScheduleStatus::Normal,
        }
    }

    fn pricing(store: &Arc<MemoryStore>) -> PricingService {
        PricingService::new(Arc::new(StorePriceResolver::new(Arc::clone(store))), AppConfig::default())
    }

    #[tokio::test]
    async fn test_falls_back_to_category_table() {
        let store = Arc::new(MemoryStore::new());
        let service = pricing(&store);

        let fee = service.consultation_fee(&schedule(SlotCategory::Expert), PatientIdentity::Regular).await;
        assert_eq!(fee, 100.0);
        let fee = service.consultation_fee(&schedule(SlotCategory::Special), PatientIdentity::External).await;
        assert_eq!(fee, 300.0);
    }

    #[tokio::test]
    async fn test_doctor_override_beats_wider_scopes() {
        let store = Arc::new(MemoryStore::new());
        let service = pricing(&store);
        let s = schedule(SlotCategory::Normal);

        store.set_price_rule(PriceScope::Global, SlotCategory::Normal, 60.0).await;
        store.set_price_rule(PriceScope::Department(s.department_id), SlotCategory::Normal, 70.0).await;
        store.set_price_rule(PriceScope::Clinic(s.clinic_id), SlotCategory::Normal, 80.0).await;
        store.set_price_rule(PriceScope::Doctor(s.doctor_id), SlotCategory::Normal, 90.0).await;

        let fee = service.consultation_fee(&s, PatientIdentity::Regular).await;
        assert_eq!(fee, 90.0);
    }

    #[tokio::test]
    async fn test_chain_walks_outward_when_inner_scopes_miss() {
        let store = Arc::new(MemoryStore::new());
        let service = pricing(&store);
        let s = schedule(SlotCategory::Normal);

        store.set_price_rule(PriceScope::Global, SlotCategory::Normal, 60.0).await;
        store.set_price_rule(PriceScope::Department(s.department_id), SlotCategory::Normal, 70.0).await;

        let fee = service.consultation_fee(&s, PatientIdentity::Regular).await;
        assert_eq!(fee, 70.0);
    }

    #[tokio::test]
    async fn test_student_discount_rounds_half_up() {
        let store = Arc::new(MemoryStore::new());
        let service = pricing(&store);
        let s = schedule(SlotCategory::Normal);

        store.set_price_rule(PriceScope::Doctor(s.doctor_id), SlotCategory::Normal, 99.99).await;

        // 99.99 * 0.5 = 49.995, which rounds up to 50.00.
        let fee = service.consultation_fee(&s, PatientIdentity::Student).await;
        assert_eq!(fee, 50.0);
    }

    #[tokio::test]
    async fn test_external_patients_pay_full_price() {
        let store = Arc::new(MemoryStore::new());
        let service = pricing(&store);

        let fee = service.consultation_fee(&schedule(SlotCategory::Normal), PatientIdentity::External).await;
        assert_eq!(fee, 50.0);
    }

    #[test]
    fn test_price_diff_is_cents_exact() {
        let store = Arc::new(MemoryStore::new());
        let service = pricing(&store);
        assert_eq!(service.price_diff(100.10, 100.0), 0.10);
        assert_eq!(service.price_diff(50.0, 80.0), -30.0);
    }
}
