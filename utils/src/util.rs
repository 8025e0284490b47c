//! Small numeric and time helpers shared by the formatter and the driver.

use std::time::{SystemTime, UNIX_EPOCH};

/// Divides `a` by `b`, rounding up.
pub fn ceil_div(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

/// Returns the current time as `(seconds, nanoseconds)` since the Unix epoch.
pub fn current_timestamp() -> (i64, u32) {
    let d = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch");
    (d.as_secs() as i64, d.subsec_nanos())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ceil_div_exact() {
        assert_eq!(ceil_div(4096, 4096), 1);
        assert_eq!(ceil_div(8192, 4096), 2);
    }

    #[test]
    fn ceil_div_rounds_up() {
        assert_eq!(ceil_div(1, 4096), 1);
        assert_eq!(ceil_div(4097, 4096), 2);
    }
}
