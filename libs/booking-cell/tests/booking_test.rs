use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use uuid::Uuid;

use booking_cell::{
    BookingError, BookingService, CancelActor, PaymentTimeoutSweep, PricingService,
    StorePriceResolver,
};
use shared_config::AppConfig;
use shared_models::{
    AutoApproveGateway, LoggingNotificationGateway, Order, OrderSource, OrderStatus, Patient,
    PatientIdentity, PaymentStatus, Schedule, ScheduleStatus, SlotCategory, TimeSection,
};
use shared_store::{MemoryStore, ScheduleSections, SlotLedger};
use waitlist_cell::{MemoryWaitlistQueue, WaitlistCoordinator};

struct Harness {
    store: Arc<MemoryStore>,
    coordinator: Arc<WaitlistCoordinator>,
    booking: Arc<BookingService>,
    sweep: PaymentTimeoutSweep,
}

fn harness(config: AppConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let ledger = Arc::new(SlotLedger::new(Arc::clone(&store)));
    let sections = Arc::new(ScheduleSections::new());
    let queue = Arc::new(MemoryWaitlistQueue::new());
    let notifier = Arc::new(LoggingNotificationGateway);

    let coordinator = Arc::new(WaitlistCoordinator::new(
        Arc::clone(&store),
        Arc::clone(&ledger),
        Arc::clone(&sections),
        queue,
        notifier.clone(),
        config.clone(),
    ));
    let pricing = PricingService::new(
        Arc::new(StorePriceResolver::new(Arc::clone(&store))),
        config.clone(),
    );
    let booking = Arc::new(BookingService::new(
        Arc::clone(&store),
        Arc::clone(&ledger),
        sections,
        Arc::clone(&coordinator),
        pricing,
        Arc::new(AutoApproveGateway),
        notifier,
        config.clone(),
    ));
    let sweep = PaymentTimeoutSweep::new(Arc::clone(&store), Arc::clone(&booking), config);

    Harness { store, coordinator, booking, sweep }
}

fn upcoming_schedule(total: u32, remaining: u32) -> Schedule {
    Schedule {
        schedule_id: Uuid::new_v4(),
        doctor_id: Uuid::new_v4(),
        clinic_id: Uuid::new_v4(),
        department_id: Uuid::new_v4(),
        date: (Utc::now() + Duration::days(7)).date_naive(),
        time_section: TimeSection::Morning,
        category: SlotCategory::Normal,
        total_slots: total,
        remaining_slots: remaining,
        price: 50.0,
        status: ScheduleStatus::Normal,
    }
}

fn patient(name: &str) -> Patient {
    Patient {
        patient_id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        name: name.to_string(),
        identity: PatientIdentity::Regular,
    }
}

/// Capacity bookkeeping must always agree with the order table.
async fn assert_capacity_consistent(store: &MemoryStore, schedule_id: Uuid) {
    let schedule = store.schedule(schedule_id).await.unwrap();
    let occupying = store
        .orders_for_schedule(schedule_id)
        .await
        .iter()
        .filter(|o| o.status.occupies_slot())
        .count() as u32;
    assert_eq!(
        schedule.remaining_slots,
        schedule.total_slots - occupying,
        "remaining must equal total minus occupying orders"
    );
}

#[tokio::test]
async fn test_create_books_a_slot_and_prices_it() {
    let h = harness(AppConfig::default());
    let s = upcoming_schedule(5, 5);
    let schedule_id = s.schedule_id;
    h.store.insert_schedule(s).await.unwrap();
    let p = patient("Ada");
    h.store.insert_patient(p.clone()).await;

    let confirmation = h
        .booking
        .create(p.user_id, p.patient_id, schedule_id, Some("headache".to_string()))
        .await
        .unwrap();

    assert_eq!(confirmation.status, OrderStatus::Pending);
    assert!(confirmation.need_pay);
    assert_eq!(confirmation.pay_amount, 50.0);
    assert_eq!(h.store.schedule(schedule_id).await.unwrap().remaining_slots, 4);
    assert_capacity_consistent(&h.store, schedule_id).await;
}

#[tokio::test]
async fn test_create_requires_ownership() {
    let h = harness(AppConfig::default());
    let s = upcoming_schedule(5, 5);
    let schedule_id = s.schedule_id;
    h.store.insert_schedule(s).await.unwrap();
    let p = patient("Ada");
    h.store.insert_patient(p.clone()).await;

    let result = h.booking.create(Uuid::new_v4(), p.patient_id, schedule_id, None).await;
    assert_matches!(result, Err(BookingError::Authorization { .. }));
    assert_eq!(h.store.schedule(schedule_id).await.unwrap().remaining_slots, 5);
}

#[tokio::test]
async fn test_create_rejects_duplicates_even_when_waitlisted() {
    let h = harness(AppConfig::default());
    let s = upcoming_schedule(2, 2);
    let schedule_id = s.schedule_id;
    h.store.insert_schedule(s).await.unwrap();
    let p = patient("Ada");
    h.store.insert_patient(p.clone()).await;

    let confirmation = h.booking.create(p.user_id, p.patient_id, schedule_id, None).await.unwrap();
    let again = h.booking.create(p.user_id, p.patient_id, schedule_id, None).await;
    assert_matches!(again, Err(BookingError::DuplicateBooking { .. }));

    // A waitlist claim on the same schedule also blocks a direct booking.
    h.booking.cancel(confirmation.order_id, CancelActor::User(p.user_id)).await.unwrap();
    let waitlisted = Order::new_waitlist(p.patient_id, schedule_id, 50.0, None, 1);
    h.store.insert_order(waitlisted).await.unwrap();

    let with_waitlist = h.booking.create(p.user_id, p.patient_id, schedule_id, None).await;
    assert_matches!(with_waitlist, Err(BookingError::DuplicateBooking { .. }));
}

#[tokio::test]
async fn test_create_enforces_rolling_quota() {
    let config = AppConfig { quota_max_active: 2, ..AppConfig::default() };
    let h = harness(config);
    let p = patient("Ada");
    h.store.insert_patient(p.clone()).await;

    for _ in 0..2 {
        let s = upcoming_schedule(3, 3);
        let schedule_id = s.schedule_id;
        h.store.insert_schedule(s).await.unwrap();
        h.booking.create(p.user_id, p.patient_id, schedule_id, None).await.unwrap();
    }

    let s = upcoming_schedule(3, 3);
    let schedule_id = s.schedule_id;
    h.store.insert_schedule(s).await.unwrap();
    let result = h.booking.create(p.user_id, p.patient_id, schedule_id, None).await;
    assert_matches!(result, Err(BookingError::QuotaExceeded(_)));
}

#[tokio::test]
async fn test_create_rejects_suspended_sessions() {
    let h = harness(AppConfig::default());
    let mut s = upcoming_schedule(5, 5);
    s.status = ScheduleStatus::Suspended;
    let schedule_id = s.schedule_id;
    h.store.insert_schedule(s).await.unwrap();
    let p = patient("Ada");
    h.store.insert_patient(p.clone()).await;

    let result = h.booking.create(p.user_id, p.patient_id, schedule_id, None).await;
    assert_matches!(result, Err(BookingError::ScheduleUnavailable(_)));
}

#[tokio::test]
async fn test_concurrent_creates_allocate_exactly_once() {
    // Scenario: one slot, two simultaneous bookers.
    let h = harness(AppConfig::default());
    let s = upcoming_schedule(1, 1);
    let schedule_id = s.schedule_id;
    h.store.insert_schedule(s).await.unwrap();
    let a = patient("Ada");
    let b = patient("Ben");
    h.store.insert_patient(a.clone()).await;
    h.store.insert_patient(b.clone()).await;

    let booking_a = Arc::clone(&h.booking);
    let booking_b = Arc::clone(&h.booking);
    let task_a =
        tokio::spawn(async move { booking_a.create(a.user_id, a.patient_id, schedule_id, None).await });
    let task_b =
        tokio::spawn(async move { booking_b.create(b.user_id, b.patient_id, schedule_id, None).await });

    let results = [task_a.await.unwrap(), task_b.await.unwrap()];
    let wins = results.iter().filter(|r| r.is_ok()).count();
    let exhausted = results
        .iter()
        .filter(|r| matches!(r, Err(BookingError::CapacityExhausted(_))))
        .count();

    assert_eq!(wins, 1, "exactly one booker gets the slot");
    assert_eq!(exhausted, 1, "the loser is routed to the waitlist");
    assert_eq!(h.store.schedule(schedule_id).await.unwrap().remaining_slots, 0);
    assert_capacity_consistent(&h.store, schedule_id).await;
}

#[tokio::test]
async fn test_pay_confirms_without_touching_the_ledger() {
    let h = harness(AppConfig::default());
    let s = upcoming_schedule(2, 2);
    let schedule_id = s.schedule_id;
    h.store.insert_schedule(s).await.unwrap();
    let p = patient("Ada");
    h.store.insert_patient(p.clone()).await;

    let confirmation = h.booking.create(p.user_id, p.patient_id, schedule_id, None).await.unwrap();
    let paid = h.booking.pay(confirmation.order_id).await.unwrap();

    assert_eq!(paid.status, OrderStatus::Confirmed);
    assert_eq!(paid.payment_status, PaymentStatus::Paid);
    assert_eq!(h.store.schedule(schedule_id).await.unwrap().remaining_slots, 1);

    let again = h.booking.pay(confirmation.order_id).await;
    assert_matches!(again, Err(BookingError::InvalidStatusTransition { .. }));
}

#[tokio::test]
async fn test_cancel_refunds_releases_and_is_single_shot() {
    let h = harness(AppConfig::default());
    let s = upcoming_schedule(1, 1);
    let schedule_id = s.schedule_id;
    h.store.insert_schedule(s).await.unwrap();
    let p = patient("Ada");
    h.store.insert_patient(p.clone()).await;

    let confirmation = h.booking.create(p.user_id, p.patient_id, schedule_id, None).await.unwrap();
    h.booking.pay(confirmation.order_id).await.unwrap();

    let outcome = h.booking.cancel(confirmation.order_id, CancelActor::User(p.user_id)).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.refund_amount, Some(50.0));

    let order = h.store.order(confirmation.order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.payment_status, PaymentStatus::Refunded);
    assert_eq!(h.store.schedule(schedule_id).await.unwrap().remaining_slots, 1);
    assert_capacity_consistent(&h.store, schedule_id).await;

    // A second cancel must be rejected, never double-releasing.
    let again = h.booking.cancel(confirmation.order_id, CancelActor::User(p.user_id)).await;
    assert_matches!(again, Err(BookingError::InvalidStatusTransition { .. }));
    assert_eq!(h.store.schedule(schedule_id).await.unwrap().remaining_slots, 1);
}

#[tokio::test]
async fn test_cancel_rejected_inside_cutoff() {
    let h = harness(AppConfig::default());
    let mut s = upcoming_schedule(1, 0);
    s.date = (Utc::now() - Duration::days(1)).date_naive();
    let schedule_id = s.schedule_id;
    h.store.insert_schedule(s).await.unwrap();
    let p = patient("Ada");
    h.store.insert_patient(p.clone()).await;

    let order = Order::new_pending(p.patient_id, schedule_id, 50.0, None);
    let order_id = order.order_id;
    h.store.insert_order(order).await.unwrap();

    let result = h.booking.cancel(order_id, CancelActor::User(p.user_id)).await;
    assert_matches!(result, Err(BookingError::CancelCutoffPassed { .. }));
}

#[tokio::test]
async fn test_cancel_hands_slot_to_waitlist_without_exposing_it() {
    // Scenario: sold-out session, one waitlisted patient, a confirmed
    // order cancels, and the freed unit goes straight to the waitlist.
    let h = harness(AppConfig::default());
    let s = upcoming_schedule(1, 1);
    let schedule_id = s.schedule_id;
    h.store.insert_schedule(s).await.unwrap();
    let a = patient("Ada");
    let b = patient("Ben");
    h.store.insert_patient(a.clone()).await;
    h.store.insert_patient(b.clone()).await;

    let confirmation = h.booking.create(a.user_id, a.patient_id, schedule_id, None).await.unwrap();
    h.booking.pay(confirmation.order_id).await.unwrap();

    let ticket = h.coordinator.join(b.user_id, b.patient_id, schedule_id).await.unwrap();
    assert_eq!(ticket.queue_position, 1);

    h.booking.cancel(confirmation.order_id, CancelActor::User(a.user_id)).await.unwrap();

    let promoted = h.store.order(ticket.order_id).await.unwrap();
    assert_eq!(promoted.status, OrderStatus::Pending);
    assert_eq!(promoted.source, OrderSource::Waitlist);
    // Capacity was handed over inside the cascade, never left visible.
    assert_eq!(h.store.schedule(schedule_id).await.unwrap().remaining_slots, 0);
    assert_capacity_consistent(&h.store, schedule_id).await;
}

#[tokio::test]
async fn test_timeout_sweep_expires_and_promotes() {
    // Scenario: P pending past the 30-minute window, Q waitlisted; the
    // sweep expires P and the cascade promotes Q in the same pass.
    let h = harness(AppConfig::default());
    let s = upcoming_schedule(1, 0);
    let schedule_id = s.schedule_id;
    h.store.insert_schedule(s).await.unwrap();
    let p = patient("Pat");
    let q = patient("Quinn");
    h.store.insert_patient(p.clone()).await;
    h.store.insert_patient(q.clone()).await;

    let mut stale = Order::new_pending(p.patient_id, schedule_id, 50.0, None);
    stale.pending_since = Utc::now() - Duration::minutes(31);
    let stale_id = stale.order_id;
    h.store.insert_order(stale).await.unwrap();

    let ticket = h.coordinator.join(q.user_id, q.patient_id, schedule_id).await.unwrap();

    assert_eq!(h.sweep.run_once().await, 1);

    let expired = h.store.order(stale_id).await.unwrap();
    assert_eq!(expired.status, OrderStatus::Timeout);
    assert_eq!(expired.payment_status, PaymentStatus::Failed);

    let promoted = h.store.order(ticket.order_id).await.unwrap();
    assert_eq!(promoted.status, OrderStatus::Pending);
    assert_eq!(h.store.schedule(schedule_id).await.unwrap().remaining_slots, 0);
    assert_capacity_consistent(&h.store, schedule_id).await;

    // Fresh pending orders are left alone.
    assert_eq!(h.sweep.run_once().await, 0);
}

#[tokio::test]
async fn test_reschedule_moves_capacity_between_sessions() {
    // Scenario: move the only booking of S1 to S2 and check both counters.
    let h = harness(AppConfig::default());
    let s1 = upcoming_schedule(1, 1);
    let mut s2 = upcoming_schedule(3, 3);
    s2.doctor_id = s1.doctor_id;
    s2.clinic_id = s1.clinic_id;
    s2.department_id = s1.department_id;
    s2.time_section = TimeSection::Afternoon;
    let (s1_id, s2_id) = (s1.schedule_id, s2.schedule_id);
    h.store.insert_schedule(s1).await.unwrap();
    h.store.insert_schedule(s2).await.unwrap();

    let p = patient("Ada");
    h.store.insert_patient(p.clone()).await;
    let confirmation = h.booking.create(p.user_id, p.patient_id, s1_id, None).await.unwrap();
    assert_eq!(h.store.schedule(s1_id).await.unwrap().remaining_slots, 0);

    let outcome = h.booking.reschedule(p.user_id, confirmation.order_id, s2_id).await.unwrap();
    assert_eq!(outcome.price_diff, 0.0);

    let order = h.store.order(confirmation.order_id).await.unwrap();
    assert_eq!(order.schedule_id, s2_id);
    assert_eq!(h.store.schedule(s1_id).await.unwrap().remaining_slots, 1);
    assert_eq!(h.store.schedule(s2_id).await.unwrap().remaining_slots, 2);
    assert_capacity_consistent(&h.store, s1_id).await;
    assert_capacity_consistent(&h.store, s2_id).await;
}

#[tokio::test]
async fn test_reschedule_requires_matching_sessions() {
    let h = harness(AppConfig::default());
    let s1 = upcoming_schedule(2, 2);
    let mut s2 = upcoming_schedule(2, 2);
    s2.doctor_id = s1.doctor_id;
    s2.clinic_id = s1.clinic_id;
    s2.category = SlotCategory::Expert;
    let (s1_id, s2_id) = (s1.schedule_id, s2.schedule_id);
    h.store.insert_schedule(s1).await.unwrap();
    h.store.insert_schedule(s2).await.unwrap();

    let p = patient("Ada");
    h.store.insert_patient(p.clone()).await;
    let confirmation = h.booking.create(p.user_id, p.patient_id, s1_id, None).await.unwrap();

    let result = h.booking.reschedule(p.user_id, confirmation.order_id, s2_id).await;
    assert_matches!(result, Err(BookingError::ScheduleMismatch(_)));
}

#[tokio::test]
async fn test_reschedule_rejects_exhausted_target() {
    let h = harness(AppConfig::default());
    let s1 = upcoming_schedule(2, 2);
    let mut s2 = upcoming_schedule(1, 0);
    s2.doctor_id = s1.doctor_id;
    s2.clinic_id = s1.clinic_id;
    s2.department_id = s1.department_id;
    let (s1_id, s2_id) = (s1.schedule_id, s2.schedule_id);
    h.store.insert_schedule(s1).await.unwrap();
    h.store.insert_schedule(s2).await.unwrap();

    let p = patient("Ada");
    h.store.insert_patient(p.clone()).await;
    let confirmation = h.booking.create(p.user_id, p.patient_id, s1_id, None).await.unwrap();

    let result = h.booking.reschedule(p.user_id, confirmation.order_id, s2_id).await;
    assert_matches!(result, Err(BookingError::CapacityExhausted(_)));
    // The original slot is untouched by the failed move.
    assert_eq!(h.store.schedule(s1_id).await.unwrap().remaining_slots, 1);
}

#[tokio::test]
async fn test_paid_reschedule_requires_identical_fee() {
    let h = harness(AppConfig::default());
    let s1 = upcoming_schedule(2, 2);
    let mut s2 = upcoming_schedule(2, 2);
    s2.doctor_id = s1.doctor_id;
    s2.clinic_id = s1.clinic_id;
    // Same doctor and clinic, but the target department carries an override.
    let (s1_id, s2_id) = (s1.schedule_id, s2.schedule_id);
    let s2_department = s2.department_id;
    h.store.insert_schedule(s1).await.unwrap();
    h.store.insert_schedule(s2).await.unwrap();
    h.store
        .set_price_rule(shared_store::PriceScope::Department(s2_department), SlotCategory::Normal, 80.0)
        .await;

    let p = patient("Ada");
    h.store.insert_patient(p.clone()).await;
    let confirmation = h.booking.create(p.user_id, p.patient_id, s1_id, None).await.unwrap();
    h.booking.pay(confirmation.order_id).await.unwrap();

    let result = h.booking.reschedule(p.user_id, confirmation.order_id, s2_id).await;
    assert_matches!(result, Err(BookingError::PriceMismatch { .. }));

    // Unpaid orders may move and simply repay the new fee.
    let confirmation2 = h.booking.create(p.user_id, p.patient_id, s2_id, None).await.unwrap();
    assert_eq!(confirmation2.pay_amount, 80.0);
}
