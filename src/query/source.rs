//! Query sources and time ranges

use std::fmt;

use super::expr::Field;

/// Lowest representable timestamp (nanoseconds)
pub const MIN_TIME: i64 = i64::MIN;

/// Highest representable timestamp (nanoseconds)
pub const MAX_TIME: i64 = i64::MAX;

/// A measurement in the FROM clause
///
/// `regex` selects every measurement whose name matches it; expansion is
/// done by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Measurement {
    pub database: String,
    pub retention_policy: String,
    pub name: String,
    pub regex: Option<String>,
}

impl Measurement {
    pub fn new(
        database: impl Into<String>,
        retention_policy: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            retention_policy: retention_policy.into(),
            name: name.into(),
            regex: None,
        }
    }

    pub fn with_regex(mut self, regex: impl Into<String>) -> Self {
        self.regex = Some(regex.into());
        self
    }

    /// Copy of this source pinned to one concrete measurement name
    pub fn resolved(&self, name: impl Into<String>) -> Self {
        Self {
            database: self.database.clone(),
            retention_policy: self.retention_policy.clone(),
            name: name.into(),
            regex: None,
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.", self.database, self.retention_policy)?;
        match &self.regex {
            Some(re) => write!(f, "/{}/", re),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A nested SELECT used as a source
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubQuery {
    pub fields: Vec<Field>,
    pub sources: Vec<QuerySource>,
    pub dimensions: Vec<String>,
}

impl SubQuery {
    pub fn new(fields: Vec<Field>, sources: Vec<QuerySource>) -> Self {
        Self {
            fields,
            sources,
            dimensions: Vec::new(),
        }
    }
}

/// Source in a FROM clause
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QuerySource {
    Measurement(Measurement),
    SubQuery(Box<SubQuery>),
}

impl QuerySource {
    pub fn as_measurement(&self) -> Option<&Measurement> {
        match self {
            QuerySource::Measurement(m) => Some(m),
            QuerySource::SubQuery(_) => None,
        }
    }

    pub fn is_sub_query(&self) -> bool {
        matches!(self, QuerySource::SubQuery(_))
    }
}

impl From<Measurement> for QuerySource {
    fn from(m: Measurement) -> Self {
        QuerySource::Measurement(m)
    }
}

impl From<SubQuery> for QuerySource {
    fn from(s: SubQuery) -> Self {
        QuerySource::SubQuery(Box::new(s))
    }
}

/// Inclusive time range in nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeRange {
    pub min: i64,
    pub max: i64,
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl TimeRange {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    pub fn unbounded() -> Self {
        Self {
            min: MIN_TIME,
            max: MAX_TIME,
        }
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.min <= other.max && other.min <= self.max
    }

    pub fn contains(&self, ts: i64) -> bool {
        self.min <= ts && ts <= self.max
    }

    /// Common part of both ranges, `None` when disjoint
    pub fn intersect(&self, other: &TimeRange) -> Option<TimeRange> {
        let min = self.min.max(other.min);
        let max = self.max.min(other.max);
        (min <= max).then_some(TimeRange { min, max })
    }

    /// Smallest range covering both
    pub fn envelope(&self, other: &TimeRange) -> TimeRange {
        TimeRange {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_range_ops() {
        let a = TimeRange::new(0, 100);
        let b = TimeRange::new(50, 200);
        assert!(a.overlaps(&b));
        assert_eq!(a.intersect(&b), Some(TimeRange::new(50, 100)));
        assert_eq!(a.envelope(&b), TimeRange::new(0, 200));
        assert_eq!(a.intersect(&TimeRange::new(101, 110)), None);
        assert!(a.contains(100));
        assert!(!a.contains(101));
    }

    #[test]
    fn test_measurement_display() {
        let m = Measurement::new("db0", "rp0", "cpu");
        assert_eq!(m.to_string(), "db0.rp0.cpu");
        let re = Measurement::new("db0", "rp0", "").with_regex("cpu.*");
        assert_eq!(re.to_string(), "db0.rp0./cpu.*/");
        assert_eq!(re.resolved("cpu1").regex, None);
    }
}
