//! Field filters, ordering and limits for collection queries.
//!
//! A [`Filter`] is evaluated natively by MongoDB (via [`Filter::to_document`])
//! and in-process by the memory backend (via [`Filter::matches`]); both must
//! agree on which documents match.

use std::cmp::Ordering;

use mongodb::bson::{Bson, Document};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Value is an array of candidates; matches if any is equal
    In,
}

impl Op {
    fn operator(self) -> &'static str {
        match self {
            Op::Eq => "$eq",
            Op::Ne => "$ne",
            Op::Gt => "$gt",
            Op::Gte => "$gte",
            Op::Lt => "$lt",
            Op::Lte => "$lte",
            Op::In => "$in",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub field: String,
    pub op: Op,
    pub value: Bson,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Conjunction of field clauses with optional ordering and limit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub clauses: Vec<Clause>,
    pub order: Option<(String, SortOrder)>,
    pub limit: Option<usize>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clause(mut self, field: &str, op: Op, value: impl Into<Bson>) -> Self {
        self.clauses.push(Clause {
            field: field.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn eq(self, field: &str, value: impl Into<Bson>) -> Self {
        self.clause(field, Op::Eq, value)
    }

    pub fn ne(self, field: &str, value: impl Into<Bson>) -> Self {
        self.clause(field, Op::Ne, value)
    }

    pub fn gt(self, field: &str, value: impl Into<Bson>) -> Self {
        self.clause(field, Op::Gt, value)
    }

    pub fn gte(self, field: &str, value: impl Into<Bson>) -> Self {
        self.clause(field, Op::Gte, value)
    }

    pub fn lt(self, field: &str, value: impl Into<Bson>) -> Self {
        self.clause(field, Op::Lt, value)
    }

    pub fn lte(self, field: &str, value: impl Into<Bson>) -> Self {
        self.clause(field, Op::Lte, value)
    }

    /// Field equals any of `values`
    pub fn one_of<V: Into<Bson>>(self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values: Vec<Bson> = values.into_iter().map(Into::into).collect();
        self.clause(field, Op::In, values)
    }

    pub fn order_by(mut self, field: &str, order: SortOrder) -> Self {
        self.order = Some((field.to_string(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `doc` satisfies every clause
    pub fn matches(&self, doc: &Document) -> bool {
        self.clauses.iter().all(|clause| {
            let value = lookup(doc, &clause.field).unwrap_or(&Bson::Null);
            let ord = compare(value, &clause.value);
            match clause.op {
                Op::Eq => values_equal(value, &clause.value),
                Op::Ne => !values_equal(value, &clause.value),
                Op::Gt => ord == Some(Ordering::Greater),
                Op::Gte => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
                Op::Lt => ord == Some(Ordering::Less),
                Op::Lte => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
                Op::In => match &clause.value {
                    Bson::Array(candidates) => {
                        candidates.iter().any(|candidate| values_equal(value, candidate))
                    }
                    _ => false,
                },
            }
        })
    }

    /// MongoDB query document; clauses on the same field are merged
    pub fn to_document(&self) -> Document {
        let mut query = Document::new();
        for clause in &self.clauses {
            match query.get_mut(&clause.field) {
                Some(Bson::Document(ops)) => {
                    ops.insert(clause.op.operator(), clause.value.clone());
                }
                _ => {
                    let mut ops = Document::new();
                    ops.insert(clause.op.operator(), clause.value.clone());
                    query.insert(clause.field.clone(), ops);
                }
            }
        }
        query
    }

    /// MongoDB sort document, if an order was requested
    pub fn sort_document(&self) -> Option<Document> {
        self.order.as_ref().map(|(field, order)| {
            let mut sort = Document::new();
            let direction = match order {
                SortOrder::Asc => 1,
                SortOrder::Desc => -1,
            };
            sort.insert(field.clone(), direction);
            sort
        })
    }

    /// Ordering for in-process evaluation, following MongoDB's type ranks
    pub fn sort_cmp(&self, a: &Document, b: &Document) -> Ordering {
        let Some((field, order)) = &self.order else {
            return Ordering::Equal;
        };
        let left = lookup(a, field).unwrap_or(&Bson::Null);
        let right = lookup(b, field).unwrap_or(&Bson::Null);
        let ord = type_rank(left)
            .cmp(&type_rank(right))
            .then_with(|| compare(left, right).unwrap_or(Ordering::Equal));
        match order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    }
}

/// Resolve a possibly dotted path
fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        match current {
            Bson::Document(inner) => current = inner.get(part)?,
            _ => return None,
        }
    }
    Some(current)
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Double(n) => Some(*n),
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        _ => None,
    }
}

fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Comparison within one type class; `None` across classes
fn compare(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.cmp(y)),
        (Bson::Null, Bson::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        _ => 11,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn test_eq_matches_across_numeric_types() {
        let filter = Filter::new().eq("minimum_stock", 5_i64);

        assert!(filter.matches(&doc! { "minimum_stock": 5_i32 }));
        assert!(filter.matches(&doc! { "minimum_stock": 5.0 }));
        assert!(!filter.matches(&doc! { "minimum_stock": 6_i64 }));
        assert!(!filter.matches(&doc! {}));
    }

    #[test]
    fn test_range_clauses() {
        let filter = Filter::new().gte("sale_price", 10.0).lt("sale_price", 20.0);

        assert!(filter.matches(&doc! { "sale_price": 10.0 }));
        assert!(filter.matches(&doc! { "sale_price": 19 }));
        assert!(!filter.matches(&doc! { "sale_price": 20.0 }));
        assert!(!filter.matches(&doc! { "sale_price": "15" }));
    }

    #[test]
    fn test_ne_matches_missing_field() {
        let filter = Filter::new().ne("company_id", "acme");

        assert!(filter.matches(&doc! {}));
        assert!(filter.matches(&doc! { "company_id": "globex" }));
        assert!(!filter.matches(&doc! { "company_id": "acme" }));
    }

    #[test]
    fn test_one_of() {
        let filter = Filter::new().one_of("code", [Bson::from("123"), Bson::Int64(123)]);

        assert!(filter.matches(&doc! { "code": "123" }));
        assert!(filter.matches(&doc! { "code": 123_i32 }));
        assert!(filter.matches(&doc! { "code": 123.0 }));
        assert!(!filter.matches(&doc! { "code": "0123" }));
        assert!(!filter.matches(&doc! {}));
        assert_eq!(
            filter.to_document(),
            doc! { "code": { "$in": ["123", 123_i64] } }
        );
    }

    #[test]
    fn test_dotted_path() {
        let filter = Filter::new().eq("image_recognition_data.label", "Cola 500ml");
        let doc = doc! { "image_recognition_data": { "label": "Cola 500ml" } };

        assert!(filter.matches(&doc));
        assert!(!filter.matches(&doc! { "image_recognition_data": "Cola 500ml" }));
    }

    #[test]
    fn test_to_document_merges_same_field() {
        let filter = Filter::new()
            .eq("company_id", "acme")
            .gte("sale_price", 1.0)
            .lte("sale_price", 9.0);

        assert_eq!(
            filter.to_document(),
            doc! {
                "company_id": { "$eq": "acme" },
                "sale_price": { "$gte": 1.0, "$lte": 9.0 },
            }
        );
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = Filter::new();

        assert!(filter.matches(&doc! { "anything": 1 }));
        assert!(filter.to_document().is_empty());
        assert!(filter.sort_document().is_none());
    }

    #[test]
    fn test_sort_cmp() {
        let filter = Filter::new().order_by("name", SortOrder::Desc);
        let a = doc! { "name": "Apple" };
        let b = doc! { "name": "Banana" };

        assert_eq!(filter.sort_cmp(&a, &b), Ordering::Greater);
        assert_eq!(filter.sort_document(), Some(doc! { "name": -1 }));

        // Missing values sort first ascending
        let asc = Filter::new().order_by("name", SortOrder::Asc);
        assert_eq!(asc.sort_cmp(&doc! {}, &a), Ordering::Less);
    }
}
