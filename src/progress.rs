/// Progress Module
///
/// Receives numeric progress updates (current block / total blocks) from the
/// forward collector.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, current: u64, total: u64);
}

/// Logs progress through `tracing`
#[derive(Debug, Default)]
pub struct LogProgress {
    label: String,
}

impl LogProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into() }
    }
}

impl ProgressReporter for LogProgress {
    fn report(&self, current: u64, total: u64) {
        tracing::info!(
            "{} progress: {}/{} blocks ({:.1}%)",
            self.label,
            format_number(current),
            format_number(total),
            percentage(current, total)
        );
    }
}

fn percentage(current: u64, total: u64) -> f64 {
    if total == 0 {
        100.0
    } else {
        (current.min(total) as f64 / total as f64) * 100.0
    }
}

/// Format a number with thousand separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();

    for (count, c) in s.chars().rev().enumerate() {
        if count > 0 && count % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }

    result.chars().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(1234), "1,234");
        assert_eq!(format_number(38_462_101), "38,462,101");
    }

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(50, 200), 25.0);
        assert_eq!(percentage(300, 200), 100.0);
        assert_eq!(percentage(0, 0), 100.0);
    }
}
