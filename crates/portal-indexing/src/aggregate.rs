//! Merging of fanned-out result rows into one record per primary key.
//!
//! A one-to-many join yields several rows for the same record, and those
//! rows may straddle page boundaries. The aggregator therefore withholds the
//! last record of every page that has a successor and merges it with the
//! next page's rows, however many pages that record spans.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use portal_types::{AttributeType, FieldValue, TypedValue};

use crate::source::ResultRow;

/// Delimiter used when a multi-valued field is displayed as one string.
pub const VALUE_DELIMITER: &str = ",";

/// All distinct values of one field across a record's rows.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedValue {
    pub attribute_type: AttributeType,
    /// Distinct non-null values in first-seen order.
    pub values: Vec<FieldValue>,
}

impl AggregatedValue {
    fn new(value: &TypedValue) -> Self {
        let mut aggregated = Self {
            attribute_type: value.attribute_type,
            values: Vec::new(),
        };
        aggregated.merge(&value.value);
        aggregated
    }

    fn merge(&mut self, value: &FieldValue) {
        if value.is_null() {
            return;
        }
        let display = value.to_string();
        if !self.values.iter().any(|v| v.to_string() == display) {
            self.values.push(value.clone());
        }
    }

    pub fn first(&self) -> Option<&FieldValue> {
        self.values.first()
    }

    /// Values joined with [`VALUE_DELIMITER`].
    pub fn display(&self) -> String {
        self.values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(VALUE_DELIMITER)
    }
}

/// One logical record after aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedRecord {
    /// Canonical primary key.
    pub key: String,
    pub fields: BTreeMap<String, AggregatedValue>,
}

impl AggregatedRecord {
    fn from_row(key: String, row: &ResultRow) -> Self {
        let mut record = Self {
            key,
            fields: BTreeMap::new(),
        };
        record.merge_row(row);
        record
    }

    fn merge_row(&mut self, row: &ResultRow) {
        for (path, value) in row.iter() {
            match self.fields.get_mut(path) {
                Some(existing) => existing.merge(&value.value),
                None => {
                    self.fields.insert(path.clone(), AggregatedValue::new(value));
                }
            }
        }
    }

    pub fn get(&self, path: &str) -> Option<&AggregatedValue> {
        self.fields.get(path)
    }

    pub fn first(&self, path: &str) -> Option<&FieldValue> {
        self.get(path).and_then(AggregatedValue::first)
    }

    pub fn display(&self, path: &str) -> Option<String> {
        self.get(path).map(AggregatedValue::display)
    }
}

/// Page-by-page row aggregation for one query.
#[derive(Debug)]
pub struct ResultAggregator {
    primary_key: String,
    carried: Option<AggregatedRecord>,
}

impl ResultAggregator {
    pub fn new(primary_key: impl Into<String>) -> Self {
        Self {
            primary_key: primary_key.into(),
            carried: None,
        }
    }

    /// Aggregate one page and return the records that are complete.
    ///
    /// When `more_records` is set, the record of the page's last row may
    /// continue on the next page and is carried instead of returned.
    pub fn push_page(&mut self, rows: &[ResultRow], more_records: bool) -> Vec<AggregatedRecord> {
        let mut records: Vec<AggregatedRecord> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        let carried_key = self.carried.as_ref().map(|r| r.key.clone());
        if let Some(carried) = self.carried.take() {
            positions.insert(carried.key.clone(), 0);
            records.push(carried);
        }

        let mut last_key = None;
        for row in rows {
            let Some(key) = row.get(&self.primary_key).and_then(|v| v.value.as_id()) else {
                warn!(primary_key = %self.primary_key, "Dropping row without primary key");
                continue;
            };
            match positions.get(&key) {
                Some(&position) => records[position].merge_row(row),
                None => {
                    positions.insert(key.clone(), records.len());
                    records.push(AggregatedRecord::from_row(key.clone(), row));
                }
            }
            last_key = Some(key);
        }

        if more_records {
            let withheld = last_key
                .or(carried_key)
                .and_then(|key| positions.get(&key).copied());
            if let Some(position) = withheld {
                let record = records.remove(position);
                debug!(key = %record.key, "Carrying record to next page");
                self.carried = Some(record);
            }
        }
        records
    }

    /// Release a carried record when the stream ends early.
    pub fn finish(&mut self) -> Option<AggregatedRecord> {
        self.carried.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn row(id: &str, author: &str) -> ResultRow {
        ResultRow::new()
            .with_id("forumpostid", id)
            .with_text("author.fullname", author)
    }

    #[test]
    fn test_fan_out_rows_merge() {
        let mut aggregator = ResultAggregator::new("forumpostid");
        let records = aggregator.push_page(&[row("P1", "author1"), row("P1", "author2")], false);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, "p1");
        assert_eq!(
            records[0].display("author.fullname").as_deref(),
            Some("author1,author2")
        );
    }

    #[test]
    fn test_duplicate_values_collapse() {
        let mut aggregator = ResultAggregator::new("forumpostid");
        let records = aggregator.push_page(
            &[row("P1", "author1"), row("p1", "author1"), row("{P1}", "author2")],
            false,
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("author.fullname").unwrap().values.len(), 2);
    }

    #[test]
    fn test_record_spanning_three_pages() {
        let mut aggregator = ResultAggregator::new("forumpostid");

        let first = aggregator.push_page(&[row("P0", "a"), row("P1", "a")], true);
        assert_eq!(first.iter().map(|r| r.key.as_str()).collect::<Vec<_>>(), vec!["p0"]);

        let second = aggregator.push_page(&[row("P1", "b")], true);
        assert!(second.is_empty());

        let third = aggregator.push_page(&[row("P1", "c"), row("P2", "a")], false);
        assert_eq!(third.len(), 2);
        assert_eq!(third[0].display("author.fullname").as_deref(), Some("a,b,c"));
        assert_eq!(third[1].key, "p2");
        assert_eq!(aggregator.finish(), None);
    }

    #[test]
    fn test_empty_page_keeps_carrying() {
        let mut aggregator = ResultAggregator::new("forumpostid");
        assert!(aggregator.push_page(&[row("P1", "a")], true).is_empty());
        assert!(aggregator.push_page(&[], true).is_empty());
        let last = aggregator.push_page(&[], false);
        assert_eq!(last.len(), 1);
    }

    #[test]
    fn test_rows_without_key_are_dropped() {
        let mut aggregator = ResultAggregator::new("forumpostid");
        let records = aggregator.push_page(
            &[ResultRow::new().with_text("name", "orphan"), row("P1", "a")],
            false,
        );
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_finish_releases_carried_record() {
        let mut aggregator = ResultAggregator::new("forumpostid");
        aggregator.push_page(&[row("P1", "a")], true);
        assert_eq!(aggregator.finish().map(|r| r.key), Some("p1".to_string()));
    }

    fn rows_for(fanouts: &[Vec<u8>]) -> Vec<ResultRow> {
        fanouts
            .iter()
            .enumerate()
            .flat_map(|(key, values)| {
                values
                    .iter()
                    .map(move |v| row(&format!("k{key}"), &format!("v{v}")))
            })
            .collect()
    }

    proptest! {
        #[test]
        fn prop_page_split_does_not_change_records(
            fanouts in prop::collection::vec(prop::collection::vec(0u8..4, 1..5), 0..8),
            splits in prop::collection::vec(1usize..5, 1..12),
        ) {
            let rows = rows_for(&fanouts);
            let expected = ResultAggregator::new("forumpostid").push_page(&rows, false);

            let mut pages = Vec::new();
            let mut start = 0;
            let mut sizes = splits.iter().cycle();
            while start < rows.len() {
                let size = *sizes.next().unwrap_or(&1);
                let end = (start + size).min(rows.len());
                pages.push(&rows[start..end]);
                start = end;
            }

            let mut aggregator = ResultAggregator::new("forumpostid");
            let mut actual = Vec::new();
            for (i, page) in pages.iter().enumerate() {
                actual.extend(aggregator.push_page(page, i + 1 < pages.len()));
            }

            prop_assert_eq!(actual.len(), fanouts.len());
            prop_assert_eq!(actual, expected);
            prop_assert!(aggregator.finish().is_none());
        }
    }
}
