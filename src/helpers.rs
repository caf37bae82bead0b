use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, for the TIMESTAMP metadata column.
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Keep the values whose position in `mask` is set to 1 and drop the rest.
/// Positions beyond the end of `mask` are dropped.
pub fn project_columns(columns: &[i64], mask: &[usize]) -> Vec<i64> {
    columns
        .iter()
        .zip(mask.iter())
        .filter(|(_, bit)| **bit == 1)
        .map(|(value, _)| *value)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_keeps_set_positions() {
        let columns = vec![10, 20, 30, 40];
        assert_eq!(project_columns(&columns, &[1, 0, 1, 0]), vec![10, 30]);
        assert_eq!(project_columns(&columns, &[1, 1, 1, 1]), columns);
        assert_eq!(project_columns(&columns, &[0, 0, 0, 0]), Vec::<i64>::new());
    }
}
