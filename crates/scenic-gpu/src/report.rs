//! Buffer space reports for profiling displays.

use std::fmt;

/// Used versus allocated bytes of one buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufferUsageReport {
    pub name: String,
    pub used_bytes: u64,
    pub allocated_bytes: u64,
}

impl BufferUsageReport {
    /// Fraction of the allocation holding live data, `0.0` when nothing is allocated.
    pub fn ratio(&self) -> f64 {
        if self.allocated_bytes == 0 {
            0.0
        } else {
            self.used_bytes as f64 / self.allocated_bytes as f64
        }
    }

    /// Sum a set of reports under a new name.
    pub fn total<'a>(
        name: impl Into<String>,
        reports: impl IntoIterator<Item = &'a Self>,
    ) -> Self {
        let (used_bytes, allocated_bytes) = reports
            .into_iter()
            .fold((0, 0), |(used, allocated), r| {
                (used + r.used_bytes, allocated + r.allocated_bytes)
            });
        Self {
            name: name.into(),
            used_bytes,
            allocated_bytes,
        }
    }
}

impl fmt::Display for BufferUsageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} / {} bytes ({:.1}%)",
            self.name,
            self.used_bytes,
            self.allocated_bytes,
            self.ratio() * 100.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_ratio() {
        let report = BufferUsageReport {
            name: "vertices".to_string(),
            used_bytes: 48,
            allocated_bytes: 64,
        };
        assert!((report.ratio() - 0.75).abs() < f64::EPSILON);
        assert_eq!(report.to_string(), "vertices: 48 / 64 bytes (75.0%)");
    }

    #[test]
    fn empty_allocation_has_zero_ratio() {
        let report = BufferUsageReport {
            name: "empty".to_string(),
            used_bytes: 0,
            allocated_bytes: 0,
        };
        assert_eq!(report.ratio(), 0.0);
    }

    #[test]
    fn total_sums_reports() {
        let a = BufferUsageReport {
            name: "a".to_string(),
            used_bytes: 10,
            allocated_bytes: 20,
        };
        let b = BufferUsageReport {
            name: "b".to_string(),
            used_bytes: 5,
            allocated_bytes: 30,
        };
        let total = BufferUsageReport::total("batch", [&a, &b]);
        assert_eq!(total.used_bytes, 15);
        assert_eq!(total.allocated_bytes, 50);
        assert_eq!(total.name, "batch");
    }
}
