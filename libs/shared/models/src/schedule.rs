use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session window within a clinic day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSection {
    Morning,
    Afternoon,
    Evening,
}

impl TimeSection {
    /// First call time of the section; cancellation cutoffs are measured
    /// against this instant.
    pub fn start_time(&self) -> NaiveTime {
        match self {
            TimeSection::Morning => NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
            TimeSection::Afternoon => NaiveTime::from_hms_opt(13, 30, 0).unwrap_or_default(),
            TimeSection::Evening => NaiveTime::from_hms_opt(18, 0, 0).unwrap_or_default(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimeSection::Morning => "morning",
            TimeSection::Afternoon => "afternoon",
            TimeSection::Evening => "evening",
        }
    }
}

/// Slot tier sold for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotCategory {
    Normal,
    Expert,
    Special,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Normal,
    Suspended,
}

/// One bookable doctor+clinic+date+section window with finite capacity.
///
/// `remaining_slots` is the one hot shared counter; it is mutated only by
/// the slot ledger. Everything else is effectively immutable once published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub schedule_id: Uuid,
    pub doctor_id: Uuid,
    pub clinic_id: Uuid,
    pub department_id: Uuid,
    pub date: NaiveDate,
    pub time_section: TimeSection,
    pub category: SlotCategory,
    pub total_slots: u32,
    pub remaining_slots: u32,
    pub price: f64,
    pub status: ScheduleStatus,
}

impl Schedule {
    /// Instant the session starts being served.
    pub fn starts_at(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.date.and_time(self.time_section.start_time()))
    }

    pub fn is_bookable(&self) -> bool {
        self.status == ScheduleStatus::Normal
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_slots == 0
    }

    /// True when the two sessions are interchangeable for a reschedule:
    /// same doctor, same clinic, same slot tier.
    pub fn is_reschedule_peer(&self, other: &Schedule) -> bool {
        self.doctor_id == other.doctor_id
            && self.clinic_id == other.clinic_id
            && self.category == other.category
    }
}
