use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};

use crate::error::ApiError;

/// Clinic operating window: weekdays, 08:00–18:00, half-hour slots
/// (last bookable start 17:30).
pub const OPEN_HOUR: u32 = 8;
pub const CLOSE_HOUR: u32 = 18;

pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

pub fn is_valid_slot_time(time: NaiveTime) -> bool {
    use chrono::Timelike;
    let on_grid = time.second() == 0 && (time.minute() == 0 || time.minute() == 30);
    on_grid && time.hour() >= OPEN_HOUR && time.hour() < CLOSE_HOUR
}

/// Validate a requested booking slot, mirroring what the booking form
/// offers: a weekday and a time on the half-hour grid inside opening
/// hours.
pub fn validate_slot(date: NaiveDate, time: NaiveTime) -> Result<(), ApiError> {
    if !is_business_day(date) {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "the clinic is only open Monday to Friday".into(),
        ));
    }
    if !is_valid_slot_time(time) {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "appointment_time must be a 30-minute slot between 08:00 and 17:30".into(),
        ));
    }
    Ok(())
}

/// All bookable slot times for one day, in order.
pub fn slot_times() -> Vec<NaiveTime> {
    let mut times = Vec::new();
    for hour in OPEN_HOUR..CLOSE_HOUR {
        times.push(NaiveTime::from_hms_opt(hour, 0, 0).unwrap());
        times.push(NaiveTime::from_hms_opt(hour, 30, 0).unwrap());
    }
    times
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn t(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    #[test]
    fn weekends_are_rejected() {
        assert!(is_business_day(d("2025-03-10"))); // Monday
        assert!(!is_business_day(d("2025-03-08"))); // Saturday
        assert!(!is_business_day(d("2025-03-09"))); // Sunday
        assert!(validate_slot(d("2025-03-08"), t("09:00")).is_err());
    }

    #[test]
    fn grid_times_only() {
        assert!(is_valid_slot_time(t("08:00")));
        assert!(is_valid_slot_time(t("09:30")));
        assert!(is_valid_slot_time(t("17:30")));
        assert!(!is_valid_slot_time(t("18:00"))); // closing time, not bookable
        assert!(!is_valid_slot_time(t("07:30")));
        assert!(!is_valid_slot_time(t("09:15")));
    }

    #[test]
    fn monday_morning_slot_is_valid() {
        assert!(validate_slot(d("2025-03-10"), t("09:00")).is_ok());
    }

    #[test]
    fn twenty_slots_per_day() {
        let times = slot_times();
        assert_eq!(times.len(), 20);
        assert_eq!(times.first().copied(), NaiveTime::from_hms_opt(8, 0, 0));
        assert_eq!(times.last().copied(), NaiveTime::from_hms_opt(17, 30, 0));
    }
}
