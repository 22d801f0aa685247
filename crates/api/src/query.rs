//! Query service: untyped request parameters to typed store queries.
//!
//! Each entity kind declares a whitelist of filterable fields with a value
//! type. Keys outside the whitelist are ignored; whitelisted keys whose
//! value does not parse as the declared type are rejected.

use std::collections::HashMap;
use std::sync::Arc;

use common::{ObjectId, SurrogateId};
use serde::Serialize;
use store::{
    EscrowFilter, EscrowRecord, LockedFilter, LockedRecord, Page, Pagination, ProjectionStore,
    SortOrder, StoreError,
};
use thiserror::Error;

/// Errors returned by the query service.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid value {value:?} for filter {field}: expected {expected}")]
    InvalidFilterValue {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("invalid value {value:?} for {field}: {reason}")]
    InvalidPaginationValue {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The record kinds exposed for querying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Locked,
    Escrows,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Locked => "locked",
            EntityKind::Escrows => "escrows",
        }
    }

    /// Filterable fields of this kind.
    pub fn whitelist(&self) -> &'static [FilterField] {
        match self {
            EntityKind::Locked => LOCKED_FIELDS,
            EntityKind::Escrows => ESCROW_FIELDS,
        }
    }
}

/// Declared type of a filter field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Boolean,
}

impl FieldKind {
    fn expected(&self) -> &'static str {
        match self {
            FieldKind::String => "a string",
            FieldKind::Number => "an integer",
            FieldKind::Boolean => "true or false",
        }
    }
}

/// A whitelisted query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterField {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn field(name: &'static str, kind: FieldKind) -> FilterField {
    FilterField { name, kind }
}

const LOCKED_FIELDS: &[FilterField] = &[
    field("id", FieldKind::Number),
    field("deleted", FieldKind::Boolean),
    field("creator", FieldKind::String),
    field("keyId", FieldKind::String),
    field("objectId", FieldKind::String),
];

const ESCROW_FIELDS: &[FilterField] = &[
    field("id", FieldKind::Number),
    field("cancelled", FieldKind::Boolean),
    field("swapped", FieldKind::Boolean),
    field("recipient", FieldKind::String),
    field("sender", FieldKind::String),
    field("keyId", FieldKind::String),
    field("objectId", FieldKind::String),
];

/// A filter value coerced to its field's declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Number(f64),
    Boolean(bool),
}

/// Coerces one raw parameter value to the field's type.
pub fn parse_value(field: &FilterField, raw: &str) -> Result<FilterValue, QueryError> {
    let invalid = || QueryError::InvalidFilterValue {
        field: field.name,
        value: raw.to_string(),
        expected: field.kind.expected(),
    };

    match field.kind {
        FieldKind::String => Ok(FilterValue::Text(raw.to_string())),
        FieldKind::Boolean => match raw {
            "true" => Ok(FilterValue::Boolean(true)),
            "false" => Ok(FilterValue::Boolean(false)),
            _ => Err(invalid()),
        },
        // Every numeric column is an integer, so fractional values cannot match.
        FieldKind::Number => match raw.parse::<f64>() {
            Ok(n) if n.is_finite() && n.fract() == 0.0 => Ok(FilterValue::Number(n)),
            _ => Err(invalid()),
        },
    }
}

/// Parsed filters, keyed by whitelisted field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters(HashMap<&'static str, FilterValue>);

impl Filters {
    fn text(&self, name: &str) -> Option<String> {
        match self.0.get(name) {
            Some(FilterValue::Text(v)) => Some(v.clone()),
            _ => None,
        }
    }

    fn flag(&self, name: &str) -> Option<bool> {
        match self.0.get(name) {
            Some(FilterValue::Boolean(v)) => Some(*v),
            _ => None,
        }
    }

    fn surrogate_id(&self, name: &str) -> Option<SurrogateId> {
        match self.0.get(name) {
            Some(FilterValue::Number(v)) => Some(SurrogateId::new(*v as i64)),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_locked(&self) -> LockedFilter {
        LockedFilter {
            id: self.surrogate_id("id"),
            object_id: self.text("objectId").map(ObjectId::new),
            creator: self.text("creator"),
            key_id: self.text("keyId"),
            deleted: self.flag("deleted"),
        }
    }

    pub fn to_escrow(&self) -> EscrowFilter {
        EscrowFilter {
            id: self.surrogate_id("id"),
            object_id: self.text("objectId").map(ObjectId::new),
            sender: self.text("sender"),
            recipient: self.text("recipient"),
            key_id: self.text("keyId"),
            swapped: self.flag("swapped"),
            cancelled: self.flag("cancelled"),
        }
    }
}

/// Picks the whitelisted keys out of `params`, ignoring everything else.
pub fn parse_filters(
    kind: EntityKind,
    params: &HashMap<String, String>,
) -> Result<Filters, QueryError> {
    let mut filters = HashMap::new();
    for field in kind.whitelist() {
        if let Some(raw) = params.get(field.name) {
            filters.insert(field.name, parse_value(field, raw)?);
        }
    }
    Ok(Filters(filters))
}

/// Reads `limit`, `sort` and `cursor`.
///
/// `limit` defaults to and is clamped to `max_limit`; `sort` defaults to
/// descending.
pub fn parse_pagination(
    params: &HashMap<String, String>,
    max_limit: usize,
) -> Result<Pagination, QueryError> {
    let limit = match params.get("limit") {
        None => max_limit,
        Some(raw) => match raw.parse::<usize>() {
            Ok(n) if n > 0 => n.min(max_limit),
            _ => {
                return Err(QueryError::InvalidPaginationValue {
                    field: "limit",
                    value: raw.clone(),
                    reason: "expected a positive integer",
                });
            }
        },
    };

    let sort = match params.get("sort").map(String::as_str) {
        None | Some("desc") => SortOrder::Descending,
        Some("asc") => SortOrder::Ascending,
        Some(raw) => {
            return Err(QueryError::InvalidPaginationValue {
                field: "sort",
                value: raw.to_string(),
                reason: "expected asc or desc",
            });
        }
    };

    let mut pagination = Pagination::new(limit).sort(sort);
    if let Some(raw) = params.get("cursor") {
        let cursor = raw
            .parse::<i64>()
            .map_err(|_| QueryError::InvalidPaginationValue {
                field: "cursor",
                value: raw.clone(),
                reason: "expected an integer id",
            })?;
        pagination = pagination.after(SurrogateId::new(cursor));
    }

    Ok(pagination)
}

/// A record of any queryable kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Record {
    Locked(LockedRecord),
    Escrow(EscrowRecord),
}

/// Translates request parameters into projection store queries.
#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn ProjectionStore>,
    max_limit: usize,
}

impl QueryService {
    pub fn new(store: Arc<dyn ProjectionStore>, max_limit: usize) -> Self {
        Self { store, max_limit }
    }

    pub fn max_limit(&self) -> usize {
        self.max_limit
    }

    /// Runs a query for `kind` described by raw request parameters.
    #[tracing::instrument(skip(self, params), fields(kind = kind.as_str()))]
    pub async fn query(
        &self,
        kind: EntityKind,
        params: &HashMap<String, String>,
    ) -> Result<Page<Record>, QueryError> {
        let filters = parse_filters(kind, params)?;
        let pagination = parse_pagination(params, self.max_limit)?;

        let page = match kind {
            EntityKind::Locked => {
                let page = self
                    .store
                    .query_locked(&filters.to_locked(), &pagination)
                    .await?;
                Page {
                    data: page.data.into_iter().map(Record::Locked).collect(),
                    next_cursor: page.next_cursor,
                }
            }
            EntityKind::Escrows => {
                let page = self
                    .store
                    .query_escrows(&filters.to_escrow(), &pagination)
                    .await?;
                Page {
                    data: page.data.into_iter().map(Record::Escrow).collect(),
                    next_cursor: page.next_cursor,
                }
            }
        };

        tracing::debug!(
            filters = filters.len(),
            returned = page.data.len(),
            "query served"
        );
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::{InMemoryStore, LockedUpdate};

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let filters = parse_filters(
            EntityKind::Locked,
            &params(&[("creator", "C1"), ("color", "blue"), ("swapped", "maybe")]),
        )
        .unwrap();

        assert_eq!(filters.len(), 1);
        assert_eq!(filters.to_locked().creator.as_deref(), Some("C1"));
    }

    #[test]
    fn test_bad_boolean_is_an_error() {
        let err = parse_filters(EntityKind::Locked, &params(&[("deleted", "notabool")]))
            .unwrap_err();
        assert!(matches!(
            err,
            QueryError::InvalidFilterValue {
                field: "deleted",
                ..
            }
        ));

        // "1" is not accepted as a boolean either.
        assert!(parse_filters(EntityKind::Escrows, &params(&[("swapped", "1")])).is_err());
    }

    #[test]
    fn test_escrow_whitelist() {
        let filter = parse_filters(
            EntityKind::Escrows,
            &params(&[
                ("sender", "S"),
                ("recipient", "R"),
                ("cancelled", "true"),
                ("swapped", "false"),
                ("objectId", "E1"),
                ("creator", "ignored"),
            ]),
        )
        .unwrap()
        .to_escrow();

        assert_eq!(filter.sender.as_deref(), Some("S"));
        assert_eq!(filter.recipient.as_deref(), Some("R"));
        assert_eq!(filter.cancelled, Some(true));
        assert_eq!(filter.swapped, Some(false));
        assert_eq!(filter.object_id, Some(ObjectId::new("E1")));
    }

    #[test]
    fn test_id_filter_is_numeric() {
        let filters = parse_filters(EntityKind::Locked, &params(&[("id", "2")])).unwrap();
        assert_eq!(filters.to_locked().id, Some(SurrogateId::new(2)));

        let filters = parse_filters(EntityKind::Escrows, &params(&[("id", "7.0")])).unwrap();
        assert_eq!(filters.to_escrow().id, Some(SurrogateId::new(7)));

        for raw in ["2.5", "NaN", "inf", "ten"] {
            let err = parse_filters(EntityKind::Locked, &params(&[("id", raw)])).unwrap_err();
            assert!(
                matches!(err, QueryError::InvalidFilterValue { field: "id", .. }),
                "{raw}"
            );
        }
    }

    #[test]
    fn test_pagination_defaults_and_clamping() {
        let default = parse_pagination(&params(&[]), 50).unwrap();
        assert_eq!(default.limit, 50);
        assert_eq!(default.sort, SortOrder::Descending);
        assert_eq!(default.cursor, None);

        let clamped = parse_pagination(&params(&[("limit", "500")]), 50).unwrap();
        assert_eq!(clamped.limit, 50);

        let resumed =
            parse_pagination(&params(&[("sort", "asc"), ("cursor", "7"), ("limit", "2")]), 50)
                .unwrap();
        assert_eq!(resumed.sort, SortOrder::Ascending);
        assert_eq!(resumed.cursor, Some(SurrogateId::new(7)));
        assert_eq!(resumed.limit, 2);
    }

    #[test]
    fn test_invalid_pagination() {
        for (key, value) in [
            ("limit", "0"),
            ("limit", "-1"),
            ("limit", "ten"),
            ("sort", "sideways"),
            ("cursor", "abc"),
        ] {
            let err = parse_pagination(&params(&[(key, value)]), 50).unwrap_err();
            assert!(
                matches!(err, QueryError::InvalidPaginationValue { field, .. } if field == key),
                "{key}={value}"
            );
        }
    }

    #[tokio::test]
    async fn test_query_pages_locked_records() {
        let store = InMemoryStore::new();
        for id in ["L1", "L2", "L3"] {
            store
                .upsert_locked(LockedUpdate::new(ObjectId::new(id)))
                .await
                .unwrap();
        }
        let service = QueryService::new(Arc::new(store), 50);

        let first = service
            .query(
                EntityKind::Locked,
                &params(&[("deleted", "false"), ("limit", "2")]),
            )
            .await
            .unwrap();
        let ids: Vec<SurrogateId> = first
            .data
            .iter()
            .map(|r| match r {
                Record::Locked(l) => l.id,
                Record::Escrow(e) => e.id,
            })
            .collect();
        assert_eq!(ids, vec![SurrogateId::new(3), SurrogateId::new(2)]);
        assert_eq!(first.next_cursor, Some(SurrogateId::new(2)));

        let second = service
            .query(
                EntityKind::Locked,
                &params(&[("deleted", "false"), ("limit", "2"), ("cursor", "2")]),
            )
            .await
            .unwrap();
        assert_eq!(second.data.len(), 1);
        assert_eq!(second.next_cursor, Some(SurrogateId::new(1)));
    }
}
