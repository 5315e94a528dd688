use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};

const SECONDS_PER_DAY: i64 = 86_400;

/// key: billing-dates -> every categorization compares against midnight UTC
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::default()))
}

/// Billing anchor for subscriptions the provider never told us about.
pub fn first_day_of_next_month(today: NaiveDate) -> DateTime<Utc> {
    let (year, month) = if today.month() == 12 {
        (today.year() + 1, 1)
    } else {
        (today.year(), today.month() + 1)
    };
    let first = NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(today);
    start_of_day(first)
}

/// Whole days from the start of `today` until `target`, rounded up.
pub fn days_until(target: DateTime<Utc>, today: NaiveDate) -> i64 {
    let seconds = (target - start_of_day(today)).num_seconds();
    let days = seconds / SECONDS_PER_DAY;
    if seconds % SECONDS_PER_DAY > 0 {
        days + 1
    } else {
        days
    }
}

/// Renders minor units as `$1,234.56`.
pub fn format_cents(amount_cents: i64) -> String {
    let sign = if amount_cents < 0 { "-" } else { "" };
    let absolute = amount_cents.unsigned_abs();
    let dollars = (absolute / 100).to_string();
    let cents = absolute % 100;

    let mut grouped = String::with_capacity(dollars.len() + dollars.len() / 3);
    for (index, digit) in dollars.chars().enumerate() {
        if index > 0 && (dollars.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    format!("{sign}${grouped}.{cents:02}")
}
