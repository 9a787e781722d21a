use byte_unit::{Byte, UnitType};
use chrono::{DateTime, Utc};

/// Human-readable decimal size, e.g. `1.23 GB`
#[must_use]
pub fn format_size(bytes: u64) -> String {
    let size = Byte::from(bytes);
    format!("{:#.2}", size.get_appropriate_unit(UnitType::Decimal))
}

/// Timestamp in the `create_time` format of the package manifest
#[must_use]
pub fn format_create_time(time: DateTime<Utc>) -> String {
    time.format("%Y%m%d-%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_size() {
        assert_eq!("1.23 GB", format_size(1_234_567_890));
        assert_eq!("98.77 KB", format_size(98_765));
    }

    #[test]
    fn test_format_create_time() {
        let time = Utc.with_ymd_and_hms(2026, 10, 17, 9, 5, 3).unwrap();
        assert_eq!("20261017-09:05:03", format_create_time(time));
    }
}
