//! Due-ness evaluation for dossier configurations.
//!
//! A configuration is due when the current poll falls inside its delivery
//! slot (`scheduled <= now < scheduled + window`) and its most recent
//! delivery is far enough back for its frequency. Calendar arithmetic is
//! done in the configuration's own timezone.

use crate::types::{Delivery, DossierConfig, Frequency};
use chrono::{
    DateTime, Duration, LocalResult, Months, NaiveDate, NaiveTime, TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;

/// Longest DST gap we step across when resolving a non-existent local time.
const MAX_GAP_MINUTES: i64 = 24 * 60;

/// Absolute instant of `time` on local `date` in `tz`.
///
/// Times inside a DST gap move to the first valid instant after it; times
/// repeated by a DST fold take the earlier occurrence.
pub fn local_instant(tz: Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(t) => t.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            // Transitions fall on whole minutes, so walk forward from the minute start
            let floor = naive
                .with_second(0)
                .and_then(|n| n.with_nanosecond(0))
                .unwrap_or(naive);
            (1..=MAX_GAP_MINUTES)
                .map(|m| floor + Duration::minutes(m))
                .find_map(|shifted| tz.from_local_datetime(&shifted).earliest())
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
        }
    }
}

/// Slot instant that `now` currently falls into, if any.
///
/// Both today's and yesterday's local slot are considered so a window that
/// straddles local midnight is still honoured.
pub fn current_slot(config: &DossierConfig, now: DateTime<Utc>, window: Duration) -> Option<DateTime<Utc>> {
    let today = now.with_timezone(&config.timezone).date_naive();
    [Some(today), today.pred_opt()]
        .into_iter()
        .flatten()
        .map(|date| local_instant(config.timezone, date, config.delivery_time))
        .find(|scheduled| *scheduled <= now && now < *scheduled + window)
}

/// Whether a delivery in slot `scheduled` would repeat the last one's period.
pub fn already_delivered(config: &DossierConfig, last: &Delivery, scheduled: DateTime<Utc>) -> bool {
    let tz = config.timezone;
    let last_date = last.delivered_at.with_timezone(&tz).date_naive();
    let slot_date = scheduled.with_timezone(&tz).date_naive();

    match config.frequency {
        Frequency::Daily => last_date >= slot_date,
        Frequency::Weekly => (slot_date - last_date).num_days() < 7,
        Frequency::Monthly => match last_date.checked_add_months(Months::new(1)) {
            Some(next) => slot_date < next,
            None => true,
        },
    }
}

/// The slot to deliver for right now, or `None` when the config is not due.
pub fn due_slot(
    config: &DossierConfig,
    last: Option<&Delivery>,
    now: DateTime<Utc>,
    window: Duration,
) -> Option<DateTime<Utc>> {
    if !config.active {
        return None;
    }
    let scheduled = current_slot(config, now, window)?;
    match last {
        Some(last) if already_delivered(config, last, scheduled) => None,
        _ => Some(scheduled),
    }
}

pub fn is_due(config: &DossierConfig, last: Option<&Delivery>, now: DateTime<Utc>, window: Duration) -> bool {
    due_slot(config, last, now, window).is_some()
}
