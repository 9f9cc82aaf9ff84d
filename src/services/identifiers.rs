//! Barcode and order-number generation.

use chrono::{Local, NaiveDate};
use futures::Future;
use rand::Rng;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, QuerySelect,
};
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::entities::order;
use crate::errors::ServiceError;

/// Upper bound on regeneration attempts for a unique identifier.
pub const MAX_GENERATION_ATTEMPTS: usize = 10;

/// Order numbers always read `TT-YYYYMMDD-NNNN`, whatever the barcode prefix.
pub const ORDER_NUMBER_PREFIX: &str = "TT";

/// Last sequence that fits the four-digit daily counter.
pub const MAX_DAILY_SEQUENCE: u32 = 9999;

const BASE36: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarcodeStrategy {
    /// prefix + first 6 base-36 chars of the current epoch millis + 2 random chars
    Timestamp,
    /// prefix + random base-36 chars up to `length` in total
    Random { length: usize },
}

#[derive(Debug, Clone)]
pub struct IdentifierGenerator {
    prefix: String,
    strategy: BarcodeStrategy,
}

impl IdentifierGenerator {
    pub fn new(prefix: impl Into<String>, strategy: BarcodeStrategy) -> Self {
        Self {
            prefix: prefix.into().to_ascii_uppercase(),
            strategy,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let strategy = match config.barcode_strategy.as_str() {
            "random" => BarcodeStrategy::Random {
                length: config.barcode_length,
            },
            _ => BarcodeStrategy::Timestamp,
        };
        Self::new(config.barcode_prefix.clone(), strategy)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Produces a barcode candidate without checking uniqueness.
    pub fn candidate_barcode(&self) -> String {
        let mut rng = rand::thread_rng();
        match self.strategy {
            BarcodeStrategy::Timestamp => {
                let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
                let stamp: String = to_base36(millis).chars().take(6).collect();
                format!(
                    "{}{}{}",
                    self.prefix,
                    stamp,
                    random_base36(&mut rng, 2)
                )
            }
            BarcodeStrategy::Random { length } => {
                let tail = length.saturating_sub(self.prefix.len()).max(1);
                format!("{}{}", self.prefix, random_base36(&mut rng, tail))
            }
        }
    }

    /// Generates a barcode for which `exists` reports false.
    ///
    /// Gives up with `GenerationFailed` after [`MAX_GENERATION_ATTEMPTS`].
    pub async fn unique_barcode_with<F, Fut>(&self, mut exists: F) -> Result<String, ServiceError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<bool, ServiceError>>,
    {
        for attempt in 1..=MAX_GENERATION_ATTEMPTS {
            let candidate = self.candidate_barcode();
            if !exists(candidate.clone()).await? {
                debug!(attempt, barcode = %candidate, "Generated barcode");
                return Ok(candidate);
            }
            warn!(attempt, barcode = %candidate, "Barcode collision, regenerating");
        }
        Err(ServiceError::GenerationFailed(format!(
            "could not generate a unique barcode after {} attempts",
            MAX_GENERATION_ATTEMPTS
        )))
    }

    /// Generates a barcode not yet used by any order.
    pub async fn unique_barcode<C: ConnectionTrait>(&self, db: &C) -> Result<String, ServiceError> {
        self.unique_barcode_with(|candidate| async move {
            let count = order::Entity::find()
                .filter(order::Column::Barcode.eq(candidate))
                .count(db)
                .await?;
            Ok(count > 0)
        })
        .await
    }

    /// Next order number for today in the server's local time zone.
    pub async fn next_order_number<C: ConnectionTrait>(
        &self,
        db: &C,
    ) -> Result<String, ServiceError> {
        let today = Local::now().date_naive();
        let day_prefix = order_number_day_prefix(ORDER_NUMBER_PREFIX, today);

        let issued: Vec<String> = order::Entity::find()
            .select_only()
            .column(order::Column::OrderNumber)
            .filter(order::Column::OrderNumber.starts_with(day_prefix.as_str()))
            .into_tuple()
            .all(db)
            .await?;

        let next = next_sequence(issued.iter().map(String::as_str), &day_prefix)?;
        Ok(format_order_number(ORDER_NUMBER_PREFIX, today, next))
    }
}

/// `{prefix}-YYYYMMDD-`
pub fn order_number_day_prefix(prefix: &str, date: NaiveDate) -> String {
    format!("{}-{}-", prefix, date.format("%Y%m%d"))
}

/// `{prefix}-YYYYMMDD-NNNN`
pub fn format_order_number(prefix: &str, date: NaiveDate, sequence: u32) -> String {
    format!("{}{:04}", order_number_day_prefix(prefix, date), sequence)
}

/// Extracts the daily sequence from an order number with the given day prefix.
pub fn parse_sequence(order_number: &str, day_prefix: &str) -> Option<u32> {
    order_number.strip_prefix(day_prefix)?.parse().ok()
}

/// One past the numerically highest sequence among `issued`.
///
/// Fails once the day's counter has reached [`MAX_DAILY_SEQUENCE`].
pub fn next_sequence<'a>(
    issued: impl IntoIterator<Item = &'a str>,
    day_prefix: &str,
) -> Result<u32, ServiceError> {
    let highest = issued
        .into_iter()
        .filter_map(|number| parse_sequence(number, day_prefix))
        .max()
        .unwrap_or(0);
    if highest >= MAX_DAILY_SEQUENCE {
        warn!(day_prefix, highest, "Daily order-number sequence exhausted");
        return Err(ServiceError::GenerationFailed(format!(
            "daily order-number sequence for {} is exhausted at {}",
            day_prefix.trim_end_matches('-'),
            MAX_DAILY_SEQUENCE
        )));
    }
    Ok(highest + 1)
}

pub fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    digits.into_iter().map(char::from).collect()
}

fn random_base36<R: Rng>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| char::from(BASE36[rng.gen_range(0..BASE36.len())]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn base36_encoding() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "Z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1_295), "ZZ");
    }

    #[test]
    fn timestamp_barcode_shape() {
        let gen = IdentifierGenerator::new("TT", BarcodeStrategy::Timestamp);
        let code = gen.candidate_barcode();
        assert_eq!(code.len(), 10);
        assert!(code.starts_with("TT"));
        assert!(code
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn random_barcode_respects_total_length() {
        let gen = IdentifierGenerator::new("ab", BarcodeStrategy::Random { length: 12 });
        let code = gen.candidate_barcode();
        assert_eq!(code.len(), 12);
        assert!(code.starts_with("AB"));
    }

    #[test]
    fn order_number_format_and_parse() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let number = format_order_number("TT", date, 7);
        assert_eq!(number, "TT-20240309-0007");
        assert_eq!(
            parse_sequence(&number, &order_number_day_prefix("TT", date)),
            Some(7)
        );
        assert_eq!(parse_sequence("TT-20240308-0042", "TT-20240309-"), None);
    }

    #[test]
    fn next_sequence_uses_the_numeric_maximum() {
        let day = "TT-20240309-";
        assert_eq!(next_sequence(std::iter::empty(), day).unwrap(), 1);
        assert_eq!(
            next_sequence(["TT-20240309-0009", "TT-20240309-0010", "TT-20240309-0002"], day)
                .unwrap(),
            11
        );
        // a five-digit sequence sorts below "9999" as text
        let err = next_sequence(["TT-20240309-9998", "TT-20240309-10000"], day).unwrap_err();
        assert!(
            matches!(&err, ServiceError::GenerationFailed(msg) if msg.contains("TT-20240309")),
            "{:?}",
            err
        );
        assert_eq!(next_sequence(["TT-20240308-0041", "junk"], day).unwrap(), 1);
    }

    #[test]
    fn daily_sequence_is_capped() {
        let day = "TT-20240309-";
        assert_eq!(next_sequence(["TT-20240309-9998"], day).unwrap(), 9999);
        let err = next_sequence(["TT-20240309-9999"], day).unwrap_err();
        assert!(matches!(err, ServiceError::GenerationFailed(_)));
    }

    #[tokio::test]
    async fn gives_up_after_bounded_attempts() {
        let gen = IdentifierGenerator::new("TT", BarcodeStrategy::Timestamp);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result = gen
            .unique_barcode_with(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(true) }
            })
            .await;
        assert!(matches!(result, Err(ServiceError::GenerationFailed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), MAX_GENERATION_ATTEMPTS);
    }

    #[tokio::test]
    async fn retries_until_free() {
        let gen = IdentifierGenerator::new("TT", BarcodeStrategy::Timestamp);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let code = gen
            .unique_barcode_with(move |_| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok(n < 3) }
            })
            .await
            .unwrap();
        assert!(code.starts_with("TT"));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
