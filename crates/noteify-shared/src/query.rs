//! Table query model: filter predicates, ordering and limits.
//!
//! Filters mirror the operators of the hosted service's REST layer
//! (`eq`, `in`, `cs`, `ilike`) and can also be evaluated in-process against
//! a JSON row, which is how realtime subscriptions decide whether a change
//! event is relevant.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `column = value`
    Eq(String, Value),
    /// `column` is one of `values`
    In(String, Vec<Value>),
    /// Array `column` contains every element of `values`
    Contains(String, Vec<Value>),
    /// Case-insensitive SQL `LIKE` (`%` and `_` wildcards)
    ILike(String, String),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(column.into(), value.into())
    }

    pub fn is_in<V: Into<Value>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::In(column.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn contains<V: Into<Value>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::Contains(column.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn ilike(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::ILike(column.into(), pattern.into())
    }

    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(c, _) | Filter::In(c, _) | Filter::Contains(c, _) | Filter::ILike(c, _) => c,
        }
    }

    /// Evaluate the predicate against a JSON object row.
    pub fn matches(&self, row: &Value) -> bool {
        let field = row.get(self.column()).unwrap_or(&Value::Null);
        match self {
            Filter::Eq(_, value) => field == value,
            Filter::In(_, values) => values.iter().any(|v| v == field),
            Filter::Contains(_, values) => match field {
                Value::Array(items) => values.iter().all(|v| items.contains(v)),
                _ => false,
            },
            Filter::ILike(_, pattern) => match field {
                Value::String(text) => like_match(pattern, text),
                _ => false,
            },
        }
    }
}

/// Case-insensitive SQL `LIKE`: `%` matches any run, `_` any single char,
/// `\` escapes the next character.
pub fn like_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let text: Vec<char> = text.to_lowercase().chars().collect();
    like_match_from(&pattern, &text)
}

fn like_match_from(pattern: &[char], text: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('%', rest)) => (0..=text.len()).any(|skip| like_match_from(rest, &text[skip..])),
        Some(('_', rest)) => !text.is_empty() && like_match_from(rest, &text[1..]),
        Some(('\\', rest)) if !rest.is_empty() => {
            text.first() == Some(&rest[0]) && like_match_from(&rest[1..], &text[1..])
        }
        Some((c, rest)) => text.first() == Some(c) && like_match_from(rest, &text[1..]),
    }
}

/// Escape `LIKE` wildcards so `input` only matches itself.
pub fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub direction: Direction,
}

/// A table-scoped read: all filters are ANDed together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::eq(column, value))
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order = Some(Order {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, row: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }
}
