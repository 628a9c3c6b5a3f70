//! Vendor-neutral query shape.
//!
//! `select`, `limit`, `page` and `sort` shape the query; every other key is
//! a filter. A plain value filters by equality, an operator object such as
//! `{"$gt": 100}` translates to the corresponding comparison. Adapters turn
//! the resulting [`Predicate`]s into their native syntax.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use syncbridge_core::Record;
use tracing::warn;

/// Page size used when a query does not set one.
pub const DEFAULT_LIMIT: u64 = 100;

const RESERVED_KEYS: [&str; 4] = ["select", "limit", "page", "sort"];

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Smallest first.
    #[default]
    Asc,
    /// Largest first.
    Desc,
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// Field to sort by.
    pub field: String,
    /// Direction.
    pub direction: SortDirection,
}

/// A filter comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    /// Plain value.
    Eq(Value),
    /// `$ne`
    Ne(Value),
    /// `$gt`
    Gt(Value),
    /// `$gte`
    Gte(Value),
    /// `$lt`
    Lt(Value),
    /// `$lte`
    Lte(Value),
    /// `$in`
    In(Vec<Value>),
    /// `$exists`
    Exists(bool),
}

/// One filter on one field.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// Field being filtered.
    pub field: String,
    /// The comparison.
    pub comparison: Comparison,
}

/// Query options for `find`, `find_one` and `update`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    /// Fields to return; vendor default when empty.
    pub select: Vec<String>,
    /// Page size.
    pub limit: Option<u64>,
    /// 1-based page number.
    pub page: Option<u64>,
    /// Sort keys, most significant first.
    pub sort: Vec<Sort>,
    /// Filter fields in declaration order.
    pub filters: Record,
}

impl QueryOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the JSON query shape.
    ///
    /// `select` may be a space- or comma-separated string or an array.
    /// `sort` may be a string (`"-CreatedDate Name"`, a leading `-` meaning
    /// descending) or an object of `field: "asc" | "desc" | 1 | -1`.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let Value::Object(object) = value else {
            return Self::default();
        };

        let mut options = Self {
            select: object.get("select").map(parse_select).unwrap_or_default(),
            limit: object.get("limit").and_then(as_u64),
            page: object.get("page").and_then(as_u64),
            sort: object.get("sort").map(parse_sort).unwrap_or_default(),
            filters: Record::new(),
        };
        for (key, value) in object {
            if !RESERVED_KEYS.contains(&key.as_str()) {
                options.filters.insert(key.clone(), value.clone());
            }
        }
        options
    }

    /// Sets the selected fields.
    #[must_use]
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the page size.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the page number.
    #[must_use]
    pub fn page(mut self, page: u64) -> Self {
        self.page = Some(page);
        self
    }

    /// Adds a sort key.
    #[must_use]
    pub fn sort_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push(Sort {
            field: field.into(),
            direction,
        });
        self
    }

    /// Adds a filter: a plain value or an operator object.
    #[must_use]
    pub fn filter(mut self, field: impl Into<String>, value: Value) -> Self {
        self.filters.insert(field.into(), value);
        self
    }

    /// Effective page size, at least 1.
    #[must_use]
    pub fn effective_limit(&self) -> u64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).max(1)
    }

    /// Effective page number, at least 1.
    #[must_use]
    pub fn effective_page(&self) -> u64 {
        self.page.unwrap_or(1).max(1)
    }

    /// Offset of the first record of the page, saturating at `u64::MAX`.
    #[must_use]
    pub fn offset(&self) -> u64 {
        (self.effective_page() - 1).saturating_mul(self.effective_limit())
    }

    /// Translates filters into predicates. Unknown operators are logged and
    /// skipped.
    #[must_use]
    pub fn predicates(&self) -> Vec<Predicate> {
        let mut predicates = Vec::new();
        for (field, value) in &self.filters {
            match operator_object(value) {
                Some(operators) => {
                    for (operator, operand) in operators {
                        match comparison(operator, operand) {
                            Some(comparison) => predicates.push(Predicate {
                                field: field.clone(),
                                comparison,
                            }),
                            None => warn!(%field, %operator, "skipping unsupported filter operator"),
                        }
                    }
                }
                None => predicates.push(Predicate {
                    field: field.clone(),
                    comparison: Comparison::Eq(value.clone()),
                }),
            }
        }
        predicates
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_select(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|field| !field.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn parse_sort(value: &Value) -> Vec<Sort> {
    match value {
        Value::String(s) => s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|key| !key.is_empty())
            .map(|key| match key.strip_prefix('-') {
                Some(field) => Sort {
                    field: field.to_string(),
                    direction: SortDirection::Desc,
                },
                None => Sort {
                    field: key.to_string(),
                    direction: SortDirection::Asc,
                },
            })
            .collect(),
        Value::Object(keys) => keys
            .iter()
            .map(|(field, direction)| Sort {
                field: field.clone(),
                direction: match direction {
                    Value::String(d) if d.eq_ignore_ascii_case("desc") => SortDirection::Desc,
                    Value::Number(n) if n.as_i64() == Some(-1) => SortDirection::Desc,
                    _ => SortDirection::Asc,
                },
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn operator_object(value: &Value) -> Option<&Map<String, Value>> {
    match value {
        Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => {
            Some(map)
        }
        _ => None,
    }
}

fn comparison(operator: &str, operand: &Value) -> Option<Comparison> {
    let comparison = match operator {
        "$ne" => Comparison::Ne(operand.clone()),
        "$gt" => Comparison::Gt(operand.clone()),
        "$gte" => Comparison::Gte(operand.clone()),
        "$lt" => Comparison::Lt(operand.clone()),
        "$lte" => Comparison::Lte(operand.clone()),
        "$in" => match operand {
            Value::Array(values) => Comparison::In(values.clone()),
            other => Comparison::In(vec![other.clone()]),
        },
        "$exists" => Comparison::Exists(match operand {
            Value::Bool(b) => *b,
            Value::Null => false,
            _ => true,
        }),
        _ => return None,
    };
    Some(comparison)
}

/// Normalized pagination block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Total matching records.
    pub count: u64,
    /// 1-based page number.
    pub page: u64,
    /// Page size.
    pub limit: u64,
    /// Number of the last page; 0 when nothing matched.
    pub last_page: u64,
    /// Offset of the first record on this page.
    pub start_index: u64,
}

impl Pagination {
    /// Computes the pagination block for a page of `limit` records.
    #[must_use]
    pub fn new(count: u64, page: u64, limit: u64) -> Self {
        let page = page.max(1);
        let limit = limit.max(1);
        Self {
            count,
            page,
            limit,
            last_page: count.div_ceil(limit),
            start_index: (page - 1).saturating_mul(limit),
        }
    }

    /// Pagination for `options`.
    #[must_use]
    pub fn for_options(count: u64, options: &QueryOptions) -> Self {
        Self::new(count, options.effective_page(), options.effective_limit())
    }
}

/// One page of records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginatedResult {
    /// Where this page sits.
    pub pagination: Pagination,
    /// Records on this page.
    pub data: Vec<Record>,
}
