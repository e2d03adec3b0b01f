// utils/helpers.rs
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Convertit un montant en euros en centimes (arrondi commercial)
pub fn to_cents(amount: Decimal) -> i64 {
    (amount * Decimal::from(100))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0)
}

/// Formater un montant en centimes, à la française : `12,50`
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.abs();
    format!("{}{},{:02}", sign, cents / 100, cents % 100)
}

/// Minuit UTC du jour donné
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
}

/// Date du lendemain
pub fn tomorrow(now: DateTime<Utc>) -> NaiveDate {
    (now + Duration::days(1)).date_naive()
}

/// Âge révolu à une date donnée
pub fn age_at(birth_date: NaiveDate, date: NaiveDate) -> i32 {
    use chrono::Datelike;
    let mut age = date.year() - birth_date.year();
    if (date.month(), date.day()) < (birth_date.month(), birth_date.day()) {
        age -= 1;
    }
    age
}
