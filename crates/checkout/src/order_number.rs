//! Human-readable order numbers.

use chrono::{DateTime, Utc};
use common::OrderId;

/// Formats `ORD-YYYYMMDD-XXXXXXXX`, where the suffix is the first eight hex
/// digits of the order id, upper-cased.
pub fn generate(placed_at: DateTime<Utc>, order_id: OrderId) -> String {
    let hex = order_id.as_uuid().simple().to_string().to_uppercase();
    let suffix: String = hex.chars().take(8).collect();
    format!("ORD-{}-{suffix}", placed_at.format("%Y%m%d"))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use uuid::Uuid;

    use super::*;

    #[test]
    fn format_uses_date_and_id_prefix() {
        let placed_at = Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 0).unwrap();
        let id = OrderId::from_uuid(Uuid::parse_str("0a1b2c3d-4e5f-4000-8000-000000000000").unwrap());

        assert_eq!(generate(placed_at, id), "ORD-20240309-0A1B2C3D");
    }

    #[test]
    fn distinct_ids_give_distinct_numbers() {
        let now = Utc::now();
        let a = generate(now, OrderId::new());
        let b = generate(now, OrderId::new());

        assert_eq!(a.len(), "ORD-YYYYMMDD-XXXXXXXX".len());
        assert_ne!(a, b);
    }
}
