//! In-memory result source.
//!
//! Evaluates query definitions over tables of records: selects root and
//! joined attributes, fans out rows for one-to-many joins, applies
//! `eq/ne/in/not-in/null/not-null` conditions in any scope, and pages rows
//! with a cookie that must be echoed back.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use portal_query::{
    Condition, ConditionOperator, Filter, FilterKind, JoinKind, LinkEntity, QueryDefinition,
};
use portal_types::{canonical_id, TypedValue};

use super::{ResultPage, ResultRow, ResultSource};
use crate::error::SourceError;

const DEFAULT_PAGE_SIZE: usize = 5000;

type Record = BTreeMap<String, TypedValue>;

#[derive(Default)]
struct MockState {
    tables: HashMap<String, Vec<Record>>,
    executed: Vec<QueryDefinition>,
    failures: HashMap<String, u32>,
}

/// Test double for the entity store, shared across threads.
#[derive(Default)]
pub struct MockResultSource {
    state: Mutex<MockState>,
}

impl MockResultSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to `logical_name`'s table.
    pub fn insert(&self, logical_name: &str, record: ResultRow) {
        let record: Record = record
            .iter()
            .map(|(path, value)| (path.clone(), value.clone()))
            .collect();
        self.lock()
            .tables
            .entry(logical_name.to_ascii_lowercase())
            .or_default()
            .push(record);
    }

    /// Replace every record of `logical_name` whose primary key is `id`.
    pub fn replace(&self, logical_name: &str, id: &str, record: ResultRow) {
        self.remove(logical_name, id);
        self.insert(logical_name, record);
    }

    /// Remove every record of `logical_name` whose primary key is `id`.
    pub fn remove(&self, logical_name: &str, id: &str) {
        let primary_key = portal_types::primary_key_attribute(logical_name);
        let id = canonical_id(id);
        if let Some(table) = self.lock().tables.get_mut(&logical_name.to_ascii_lowercase()) {
            table.retain(|r| r.get(&primary_key).and_then(|v| v.value.as_id()) != Some(id.clone()));
        }
    }

    /// Fail when `page` of a query on `logical_name` is requested.
    pub fn fail_on_page(&self, logical_name: &str, page: u32) {
        self.lock()
            .failures
            .insert(logical_name.to_ascii_lowercase(), page);
    }

    /// Every definition executed so far, in order.
    pub fn executed(&self) -> Vec<QueryDefinition> {
        self.lock().executed.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ResultSource for MockResultSource {
    fn execute(&self, query: &QueryDefinition) -> Result<ResultPage, SourceError> {
        let mut state = self.lock();
        state.executed.push(query.clone());

        let entity = query.entity_name().to_ascii_lowercase();
        if state.failures.get(&entity) == Some(&query.page) {
            return Err(SourceError::Unavailable(format!(
                "injected failure on page {} of {entity}",
                query.page
            )));
        }
        if query.page > 1 && query.paging_cookie.as_deref() != Some(&cookie(query.page - 1)) {
            return Err(SourceError::InvalidQuery(format!(
                "missing or stale paging cookie for page {}",
                query.page
            )));
        }

        let empty = Vec::new();
        let table = state.tables.get(&entity).unwrap_or(&empty);

        let mut rows = Vec::new();
        for record in table {
            if !matches_filters(record, &query.entity.filters)? {
                continue;
            }
            let mut root = ResultRow::new();
            for attribute in &query.entity.attributes {
                if let Some(value) = record.get(&attribute.name) {
                    root.insert(attribute.name.clone(), value.clone());
                }
            }
            let mut expanded = vec![root];
            for link in &query.entity.links {
                expanded = join(&state.tables, record, link, expanded)?;
            }
            rows.extend(expanded);
        }

        let page_size = query
            .page_size()
            .map(|c| c as usize)
            .filter(|c| *c > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE);
        let start = (query.page.max(1) as usize - 1) * page_size;
        let end = (start + page_size).min(rows.len());
        let more_records = end < rows.len();
        let page_rows = if start < rows.len() {
            rows[start..end].to_vec()
        } else {
            Vec::new()
        };

        debug!(
            entity = %entity,
            page = query.page,
            rows = page_rows.len(),
            more_records,
            "Mock source page"
        );

        Ok(ResultPage {
            rows: page_rows,
            more_records,
            paging_cookie: more_records.then(|| cookie(query.page)),
        })
    }
}

fn cookie(page: u32) -> String {
    format!("mock-page-{page}")
}

/// Expand `rows` with the records of `link` that join to `parent`.
fn join(
    tables: &HashMap<String, Vec<Record>>,
    parent: &Record,
    link: &LinkEntity,
    rows: Vec<ResultRow>,
) -> Result<Vec<ResultRow>, SourceError> {
    let key = parent.get(&link.to).and_then(|v| v.value.as_id());
    let mut matches = Vec::new();
    if let (Some(key), Some(table)) = (key, tables.get(&link.name.to_ascii_lowercase())) {
        for record in table {
            let joined = record.get(&link.from).and_then(|v| v.value.as_id());
            if joined.as_deref() == Some(key.as_str()) && matches_filters(record, &link.filters)? {
                matches.push(record);
            }
        }
    }

    if matches.is_empty() {
        return Ok(match link.link_type {
            JoinKind::Outer => rows,
            JoinKind::Inner => Vec::new(),
        });
    }

    let scope = link.scope_name();
    let mut out = Vec::new();
    for record in matches {
        let mut columns = Vec::new();
        for attribute in &link.attributes {
            if let Some(value) = record.get(&attribute.name) {
                columns.push((format!("{scope}.{}", attribute.name), value.clone()));
            }
        }
        let mut expanded: Vec<ResultRow> = rows
            .iter()
            .map(|row| {
                let mut row = row.clone();
                for (path, value) in &columns {
                    row.insert(path.clone(), value.clone());
                }
                row
            })
            .collect();
        for nested in &link.links {
            expanded = join(tables, record, nested, expanded)?;
        }
        out.extend(expanded);
    }
    Ok(out)
}

fn matches_filters(record: &Record, filters: &[Filter]) -> Result<bool, SourceError> {
    for filter in filters {
        if !matches_filter(record, filter)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches_filter(record: &Record, filter: &Filter) -> Result<bool, SourceError> {
    let mut results = Vec::with_capacity(filter.conditions.len() + filter.filters.len());
    for condition in &filter.conditions {
        results.push(matches_condition(record, condition)?);
    }
    for nested in &filter.filters {
        results.push(matches_filter(record, nested)?);
    }
    Ok(match filter.kind {
        FilterKind::And => results.iter().all(|r| *r),
        FilterKind::Or => results.is_empty() || results.iter().any(|r| *r),
    })
}

fn matches_condition(record: &Record, condition: &Condition) -> Result<bool, SourceError> {
    let value = record
        .get(&condition.attribute)
        .filter(|v| !v.value.is_null())
        .map(|v| canonical_id(&v.value.to_string()));
    let wanted = || condition.values.iter().map(|v| canonical_id(v));

    Ok(match &condition.operator {
        ConditionOperator::Null => value.is_none(),
        ConditionOperator::NotNull => value.is_some(),
        ConditionOperator::Eq | ConditionOperator::In => {
            value.is_some_and(|v| wanted().any(|w| w == v))
        }
        ConditionOperator::Ne | ConditionOperator::NotIn => {
            value.is_some_and(|v| !wanted().any(|w| w == v))
        }
        other => {
            return Err(SourceError::InvalidQuery(format!(
                "unsupported operator: {other}"
            )))
        }
    })
}
