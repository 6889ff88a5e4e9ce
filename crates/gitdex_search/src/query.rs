//! Structured queries over indexed documents.
//!
//! A [`Query`] is a conjunction of term and range filters with optional
//! sorting and paging. Backends either translate it ([`Query::to_body`]
//! produces the Elasticsearch request body) or evaluate it directly with
//! [`Query::matches`].

use serde_json::{json, Map, Value};
use std::cmp::Ordering;

/// A single filter clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals the value (or, for array fields, contains it).
    Term {
        /// Field name.
        field: String,
        /// Expected value.
        value: Value,
    },
    /// Field falls within an inclusive range.
    Range {
        /// Field name.
        field: String,
        /// Lower bound.
        gte: Option<Value>,
        /// Upper bound.
        lte: Option<Value>,
    },
}

impl Filter {
    fn matches(&self, doc: &Map<String, Value>) -> bool {
        match self {
            Filter::Term { field, value } => match doc.get(field) {
                Some(Value::Array(items)) => items.contains(value),
                Some(found) => found == value,
                None => false,
            },
            Filter::Range { field, gte, lte } => {
                let Some(found) = doc.get(field) else {
                    return false;
                };
                let above = gte
                    .as_ref()
                    .map_or(true, |low| compare(found, low) != Some(Ordering::Less));
                let below = lte
                    .as_ref()
                    .map_or(true, |high| compare(found, high) != Some(Ordering::Greater));
                above && below && !found.is_null()
            }
        }
    }

    fn to_body(&self) -> Value {
        match self {
            Filter::Term { field, value } => json!({ "term": { field.as_str(): value } }),
            Filter::Range { field, gte, lte } => {
                let mut bounds = Map::new();
                if let Some(low) = gte {
                    bounds.insert("gte".into(), low.clone());
                }
                if let Some(high) = lte {
                    bounds.insert("lte".into(), high.clone());
                }
                json!({ "range": { field.as_str(): bounds } })
            }
        }
    }
}

/// Compares two JSON scalars of the same kind.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Rank of a JSON kind when sorting values of different kinds.
fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over present values: by kind first, then by value.
/// Arrays and objects tie with their own kind.
fn total_order(a: &Value, b: &Value) -> Ordering {
    kind_rank(a).cmp(&kind_rank(b)).then_with(|| match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            _ => Ordering::Equal,
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    })
}

/// Orders one sort key. Missing values go last in either direction.
fn sort_order(a: Option<&Value>, b: Option<&Value>, order: SortOrder) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => match order {
            SortOrder::Ascending => total_order(x, y),
            SortOrder::Descending => total_order(x, y).reverse(),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// A query against one document type.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    filters: Vec<Filter>,
    sort: Vec<(String, SortOrder)>,
    from: usize,
    size: Option<usize>,
}

impl Default for Query {
    fn default() -> Self {
        Self::all()
    }
}

impl Query {
    /// Default page size when none is given.
    pub const DEFAULT_SIZE: usize = 10;

    /// Matches every document.
    pub fn all() -> Self {
        Self {
            filters: Vec::new(),
            sort: Vec::new(),
            from: 0,
            size: None,
        }
    }

    /// Adds an equality filter.
    pub fn term(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Term {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Adds an inclusive range filter. Either bound may be omitted.
    pub fn range(
        mut self,
        field: impl Into<String>,
        gte: Option<Value>,
        lte: Option<Value>,
    ) -> Self {
        self.filters.push(Filter::Range {
            field: field.into(),
            gte,
            lte,
        });
        self
    }

    /// Sorts by a field. Later calls break ties of earlier ones.
    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push((field.into(), order));
        self
    }

    /// Skips the first `from` hits.
    pub fn from(mut self, from: usize) -> Self {
        self.from = from;
        self
    }

    /// Limits the number of hits returned.
    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Returns the filters.
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Returns the offset of the first hit.
    pub fn offset(&self) -> usize {
        self.from
    }

    /// Returns the page size.
    pub fn limit(&self) -> usize {
        self.size.unwrap_or(Self::DEFAULT_SIZE)
    }

    /// Returns true if the document passes every filter.
    pub fn matches(&self, doc: &Map<String, Value>) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
    }

    /// Sorts documents in place according to the sort clauses.
    pub fn sort_documents<T>(&self, docs: &mut [T], source: impl Fn(&T) -> &Map<String, Value>) {
        if self.sort.is_empty() {
            return;
        }
        docs.sort_by(|a, b| {
            let (a, b) = (source(a), source(b));
            for (field, order) in &self.sort {
                let ord = sort_order(a.get(field), b.get(field), *order);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }

    /// Returns the `query` clause alone, as used by count requests.
    pub fn query_clause(&self) -> Value {
        if self.filters.is_empty() {
            json!({ "match_all": {} })
        } else {
            let filters: Vec<Value> = self.filters.iter().map(Filter::to_body).collect();
            json!({ "bool": { "filter": filters } })
        }
    }

    /// Returns the body that opens a scroll: no offset, and index order
    /// unless a sort is given.
    pub fn to_scroll_body(&self) -> Value {
        let mut body = self.to_body();
        if let Value::Object(fields) = &mut body {
            fields.remove("from");
            fields.entry("sort").or_insert_with(|| json!(["_doc"]));
        }
        body
    }

    /// Returns the Elasticsearch search request body.
    pub fn to_body(&self) -> Value {
        let mut body = json!({
            "query": self.query_clause(),
            "from": self.from,
            "size": self.limit(),
        });
        if !self.sort.is_empty() {
            let sort: Vec<Value> = self
                .sort
                .iter()
                .map(|(field, order)| {
                    let order = match order {
                        SortOrder::Ascending => "asc",
                        SortOrder::Descending => "desc",
                    };
                    json!({ field.as_str(): { "order": order } })
                })
                .collect();
            body["sort"] = Value::Array(sort);
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn doc(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn term_and_range_filters() {
        let d = doc(json!({"name": "Foo", "age": 30, "tags": ["a", "b"]}));
        assert!(Query::all().matches(&d));
        assert!(Query::all().term("name", "Foo").matches(&d));
        assert!(!Query::all().term("name", "Bar").matches(&d));
        assert!(Query::all().term("tags", "b").matches(&d));
        assert!(!Query::all().term("missing", 1).matches(&d));

        assert!(Query::all().range("age", Some(json!(30)), None).matches(&d));
        assert!(Query::all().range("age", Some(json!(18)), Some(json!(65))).matches(&d));
        assert!(!Query::all().range("age", Some(json!(31)), None).matches(&d));
        assert!(!Query::all().range("age", None, Some(json!(29.5))).matches(&d));
        assert!(!Query::all().term("name", "Foo").term("age", 1).matches(&d));
    }

    #[test]
    fn sorting_puts_missing_values_last() {
        let mut docs = vec![
            doc(json!({"age": 3})),
            doc(json!({})),
            doc(json!({"age": 1})),
            doc(json!({"age": 2})),
        ];
        Query::all()
            .sort_by("age", SortOrder::Ascending)
            .sort_documents(&mut docs, |d| d);
        let ages: Vec<Option<&Value>> = docs.iter().map(|d| d.get("age")).collect();
        assert_eq!(ages, [Some(&json!(1)), Some(&json!(2)), Some(&json!(3)), None]);

        Query::all()
            .sort_by("age", SortOrder::Descending)
            .sort_documents(&mut docs, |d| d);
        let ages: Vec<Option<&Value>> = docs.iter().map(|d| d.get("age")).collect();
        assert_eq!(ages, [Some(&json!(3)), Some(&json!(2)), Some(&json!(1)), None]);
    }

    #[test]
    fn sorting_mixed_kinds_is_total() {
        let mut docs = vec![
            doc(json!({"v": "b"})),
            doc(json!({"v": 2})),
            doc(json!({})),
            doc(json!({"v": true})),
            doc(json!({"v": [1]})),
            doc(json!({"v": "a"})),
            doc(json!({"v": 1.5})),
        ];
        Query::all()
            .sort_by("v", SortOrder::Ascending)
            .sort_documents(&mut docs, |d| d);
        let values: Vec<Option<&Value>> = docs.iter().map(|d| d.get("v")).collect();
        assert_eq!(
            values,
            [
                Some(&json!(true)),
                Some(&json!(1.5)),
                Some(&json!(2)),
                Some(&json!("a")),
                Some(&json!("b")),
                Some(&json!([1])),
                None,
            ]
        );
    }

    #[test]
    fn scroll_body_drops_the_offset() {
        assert_eq!(
            Query::all().from(20).size(500).to_scroll_body(),
            json!({"query": {"match_all": {}}, "size": 500, "sort": ["_doc"]})
        );
        let sorted = Query::all().sort_by("age", SortOrder::Ascending).to_scroll_body();
        assert_eq!(sorted["sort"], json!([{"age": {"order": "asc"}}]));
    }

    #[test]
    fn body_translation() {
        assert_eq!(
            Query::all().to_body(),
            json!({"query": {"match_all": {}}, "from": 0, "size": 10})
        );
        let body = Query::all()
            .term("name", "Foo")
            .range("age", Some(json!(1)), None)
            .sort_by("age", SortOrder::Descending)
            .from(20)
            .size(5)
            .to_body();
        assert_eq!(
            body,
            json!({
                "query": {"bool": {"filter": [
                    {"term": {"name": "Foo"}},
                    {"range": {"age": {"gte": 1}}}
                ]}},
                "from": 20,
                "size": 5,
                "sort": [{"age": {"order": "desc"}}]
            })
        );
    }

    fn arb_value() -> impl Strategy<Value = Option<Value>> {
        prop_oneof![
            Just(None),
            any::<i64>().prop_map(|n| Some(json!(n))),
            any::<f64>().prop_map(|f| Some(json!(f))),
            "[a-z]{0,4}".prop_map(|s| Some(json!(s))),
            any::<bool>().prop_map(|b| Some(json!(b))),
        ]
    }

    proptest! {
        #[test]
        fn missing_values_sort_last_in_both_directions(
            values in prop::collection::vec(arb_value(), 0..40),
            descending in any::<bool>(),
        ) {
            let mut docs: Vec<Map<String, Value>> = values
                .iter()
                .map(|v| {
                    let mut d = Map::new();
                    if let Some(v) = v {
                        d.insert("v".into(), v.clone());
                    }
                    d
                })
                .collect();
            let order = if descending { SortOrder::Descending } else { SortOrder::Ascending };
            Query::all().sort_by("v", order).sort_documents(&mut docs, |d| d);

            let present = docs.iter().take_while(|d| d.contains_key("v")).count();
            prop_assert!(docs[present..].iter().all(|d| !d.contains_key("v")));
            for pair in docs[..present].windows(2) {
                let ord = total_order(&pair[0]["v"], &pair[1]["v"]);
                let expected = if descending { Ordering::Less } else { Ordering::Greater };
                prop_assert_ne!(ord, expected);
            }
        }
    }
}
