use std::collections::HashSet;

use logsieve_types::Record;

/// Combined free-text and level filter for buffered records.
#[derive(Clone, Debug, Default)]
pub struct RecordFilter {
    /// Lowercased search text (empty = match all)
    search: String,

    /// Levels to include, compared verbatim (empty = all)
    levels: HashSet<String>,
}

impl RecordFilter {
    /// Filter that matches every record
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the search text; matched case-insensitively against logger,
    /// message and level.
    pub fn with_search(mut self, text: &str) -> Self {
        self.search = text.to_lowercase();
        self
    }

    /// Set the levels to include. Level strings are whatever producers sent,
    /// so comparison is verbatim, not case-folded.
    pub fn with_levels<I, S>(mut self, levels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.levels = levels.into_iter().map(Into::into).collect();
        self
    }

    /// Check if a record passes this filter
    pub fn matches(&self, record: &Record) -> bool {
        if !self.levels.is_empty() && !self.levels.contains(&record.level) {
            return false;
        }
        if self.search.is_empty() {
            return true;
        }
        record.logger.to_lowercase().contains(&self.search)
            || record.message.to_lowercase().contains(&self.search)
            || record.level.to_lowercase().contains(&self.search)
    }

    /// Check if filter matches everything
    pub fn is_empty(&self) -> bool {
        self.search.is_empty() && self.levels.is_empty()
    }
}
