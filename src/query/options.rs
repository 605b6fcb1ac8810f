//! Processor and select options

use super::expr::Expr;
use super::source::{QuerySource, TimeRange, MAX_TIME, MIN_TIME};

/// Query hint selecting a specialized read path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HintType {
    #[default]
    None,
    /// Return every point of exactly one series
    FullSeriesQuery,
    /// Return selected points of exactly one series
    SpecificSeriesQuery,
}

impl HintType {
    /// Whether the hint pins the query to a single series
    pub fn is_series_exact(&self) -> bool {
        matches!(
            self,
            HintType::FullSeriesQuery | HintType::SpecificSeriesQuery
        )
    }
}

/// Options handed to the shard mapper
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectOptions {
    pub hint_type: HintType,
    /// Maximum number of series a query may touch (0 = unlimited)
    pub max_series_n: usize,
}

impl SelectOptions {
    pub fn with_hint(mut self, hint_type: HintType) -> Self {
        self.hint_type = hint_type;
        self
    }
}

/// Options that travel with every plan node and remote query
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessorOptions {
    /// Inclusive start time (nanoseconds)
    pub start_time: i64,
    /// Inclusive end time (nanoseconds)
    pub end_time: i64,
    /// GROUP BY time interval in nanoseconds (0 = none)
    pub interval: i64,
    /// GROUP BY tag dimensions
    pub dimensions: Vec<String>,
    /// `GROUP BY *`
    pub group_by_all_dims: bool,
    pub hint_type: HintType,
    /// Row limit (0 = none)
    pub limit: usize,
    pub offset: usize,
    pub condition: Option<Expr>,
    /// Whether `condition` filters on field values (not only tags/time)
    pub has_field_condition: bool,
    pub sources: Vec<QuerySource>,
    /// Original query text, for diagnostics
    pub query: Option<String>,
    pub ascending: bool,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            start_time: MIN_TIME,
            end_time: MAX_TIME,
            interval: 0,
            dimensions: Vec::new(),
            group_by_all_dims: false,
            hint_type: HintType::None,
            limit: 0,
            offset: 0,
            condition: None,
            has_field_condition: false,
            sources: Vec::new(),
            query: None,
            ascending: true,
        }
    }
}

impl ProcessorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.start_time = range.min;
        self.end_time = range.max;
        self
    }

    pub fn with_interval(mut self, interval: i64) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_dimensions(mut self, dimensions: Vec<String>) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn with_group_by_all_dims(mut self, enabled: bool) -> Self {
        self.group_by_all_dims = enabled;
        self
    }

    pub fn with_hint(mut self, hint_type: HintType) -> Self {
        self.hint_type = hint_type;
        self
    }

    pub fn with_limit(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub fn with_condition(mut self, condition: Expr, has_field_condition: bool) -> Self {
        self.condition = Some(condition);
        self.has_field_condition = has_field_condition;
        self
    }

    pub fn with_sources(mut self, sources: Vec<QuerySource>) -> Self {
        self.sources = sources;
        self
    }

    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.end_time)
    }

    pub fn has_interval(&self) -> bool {
        self.interval > 0
    }

    pub fn has_limit(&self) -> bool {
        self.limit > 0 || self.offset > 0
    }

    pub fn is_group_by_all_dims(&self) -> bool {
        self.group_by_all_dims
    }
}
