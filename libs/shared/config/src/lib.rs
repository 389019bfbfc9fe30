use std::env;
use std::fmt::Display;
use std::str::FromStr;
use tracing::warn;

/// Booking-core settings, read from the environment with logged fallbacks.
///
/// Defaults mirror the hospital's registration policy: a 30-minute payment
/// window, a 2-hour cancellation cutoff, and at most 10 active orders per
/// patient inside a rolling 8-day window.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub redis_url: Option<String>,

    /// Minutes a PENDING order may stay unpaid before the sweep cancels it.
    pub payment_timeout_minutes: i64,
    /// Hours before the session start after which cancellation is rejected.
    pub cancel_cutoff_hours: i64,
    /// Rolling window (days) for the per-patient active-order quota.
    pub quota_window_days: i64,
    /// Maximum active orders per patient inside the quota window.
    pub quota_max_active: usize,
    /// How far ahead (days) a session may be booked.
    pub max_advance_days: i64,

    /// Maximum promotions per cascade invocation.
    pub cascade_limit: usize,
    /// TTL for ephemeral waitlist queues.
    pub waitlist_ttl_secs: i64,

    /// Global pass-over limit before a calling patient becomes a no-show.
    pub max_pass_count: u32,

    /// Identity discount multipliers applied to the resolved fee.
    pub discount_student: f64,
    pub discount_teacher: f64,
    pub discount_staff: f64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            redis_url: env::var("REDIS_URL").ok(),
            payment_timeout_minutes: env_or("BOOKING_PAYMENT_TIMEOUT_MINUTES", 30),
            cancel_cutoff_hours: env_or("BOOKING_CANCEL_CUTOFF_HOURS", 2),
            quota_window_days: env_or("BOOKING_QUOTA_WINDOW_DAYS", 8),
            quota_max_active: env_or("BOOKING_QUOTA_MAX_ACTIVE", 10),
            max_advance_days: env_or("BOOKING_MAX_ADVANCE_DAYS", 14),
            cascade_limit: env_or("WAITLIST_CASCADE_LIMIT", 10),
            waitlist_ttl_secs: env_or("WAITLIST_QUEUE_TTL_SECS", 6 * 3600),
            max_pass_count: env_or("CONSULTATION_MAX_PASS_COUNT", 3),
            discount_student: env_or("PRICING_DISCOUNT_STUDENT", 0.50),
            discount_teacher: env_or("PRICING_DISCOUNT_TEACHER", 0.50),
            discount_staff: env_or("PRICING_DISCOUNT_STAFF", 0.50),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            payment_timeout_minutes: 30,
            cancel_cutoff_hours: 2,
            quota_window_days: 8,
            quota_max_active: 10,
            max_advance_days: 14,
            cascade_limit: 10,
            waitlist_ttl_secs: 6 * 3600,
            max_pass_count: 3,
            discount_student: 0.50,
            discount_teacher: 0.50,
            discount_staff: 0.50,
        }
    }
}

fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Display + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("{} has unparsable value {:?}, using default {}", key, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}
