use time::{format_description::well_known::Rfc3339, OffsetDateTime, PrimitiveDateTime};

/// Current UTC time without offset, the representation stored in `TIMESTAMP` columns.
pub(crate) fn now_utc() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    PrimitiveDateTime::new(now.date(), now.time())
}

pub(crate) fn to_rfc3339(value: PrimitiveDateTime) -> String {
    let utc = value.assume_utc();
    utc.format(&Rfc3339).unwrap_or_else(|_| utc.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{Date, Month, Time};

    #[test]
    fn to_rfc3339_outputs_utc_z() {
        let date = Date::from_calendar_date(2025, Month::March, 14).unwrap();
        let time = Time::from_hms(8, 5, 0).unwrap();
        assert_eq!(to_rfc3339(PrimitiveDateTime::new(date, time)), "2025-03-14T08:05:00Z");
    }
}
