use common::{ObjectId, SurrogateId};
use serde::Serialize;

use crate::{EscrowRecord, LockedRecord};

/// Order of a page by surrogate id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Ascending,
    /// Newest records first.
    #[default]
    Descending,
}

/// Which slice of a record table to return.
///
/// `cursor` is the surrogate id of the last record the caller already has;
/// the page starts right after it in sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: usize,
    pub sort: SortOrder,
    pub cursor: Option<SurrogateId>,
}

impl Pagination {
    /// Creates a first-page request with the default sort order.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            sort: SortOrder::default(),
            cursor: None,
        }
    }

    /// Sets the sort order.
    pub fn sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    /// Resumes after the given surrogate id.
    pub fn after(mut self, cursor: SurrogateId) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Returns true if a row with this id lies past the cursor.
    pub fn is_past_cursor(&self, id: SurrogateId) -> bool {
        match (self.cursor, self.sort) {
            (None, _) => true,
            (Some(c), SortOrder::Ascending) => id > c,
            (Some(c), SortOrder::Descending) => id < c,
        }
    }
}

/// A page of records plus the cursor to request the next one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub next_cursor: Option<SurrogateId>,
}

/// A record that can be paged through by surrogate id.
pub trait Paginated {
    fn surrogate_id(&self) -> SurrogateId;
}

impl Paginated for LockedRecord {
    fn surrogate_id(&self) -> SurrogateId {
        self.id
    }
}

impl Paginated for EscrowRecord {
    fn surrogate_id(&self) -> SurrogateId {
        self.id
    }
}

impl<T: Paginated> Page<T> {
    /// Wraps one page of rows, taking the next cursor from the last row.
    pub fn from_rows(data: Vec<T>) -> Self {
        let next_cursor = data.last().map(Paginated::surrogate_id);
        Self { data, next_cursor }
    }
}

/// Filter over locked records. Every present field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockedFilter {
    pub id: Option<SurrogateId>,
    pub object_id: Option<ObjectId>,
    pub creator: Option<String>,
    pub key_id: Option<String>,
    pub deleted: Option<bool>,
}

impl LockedFilter {
    pub fn matches(&self, record: &LockedRecord) -> bool {
        self.id.is_none_or(|v| record.id == v)
            && self.object_id.as_ref().is_none_or(|v| &record.object_id == v)
            && self
                .creator
                .as_ref()
                .is_none_or(|v| record.creator.as_ref() == Some(v))
            && self
                .key_id
                .as_ref()
                .is_none_or(|v| record.key_id.as_ref() == Some(v))
            && self.deleted.is_none_or(|v| record.deleted == v)
    }
}

/// Filter over escrow records. Every present field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EscrowFilter {
    pub id: Option<SurrogateId>,
    pub object_id: Option<ObjectId>,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub key_id: Option<String>,
    pub swapped: Option<bool>,
    pub cancelled: Option<bool>,
}

impl EscrowFilter {
    pub fn matches(&self, record: &EscrowRecord) -> bool {
        self.id.is_none_or(|v| record.id == v)
            && self.object_id.as_ref().is_none_or(|v| &record.object_id == v)
            && self
                .sender
                .as_ref()
                .is_none_or(|v| record.sender.as_ref() == Some(v))
            && self
                .recipient
                .as_ref()
                .is_none_or(|v| record.recipient.as_ref() == Some(v))
            && self
                .key_id
                .as_ref()
                .is_none_or(|v| record.key_id.as_ref() == Some(v))
            && self.swapped.is_none_or(|v| record.swapped == v)
            && self.cancelled.is_none_or(|v| record.cancelled == v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locked(id: i64, deleted: bool) -> LockedRecord {
        LockedRecord {
            id: SurrogateId::new(id),
            object_id: ObjectId::new(format!("L{id}")),
            key_id: Some("K".into()),
            creator: Some("C1".into()),
            item_id: None,
            deleted,
        }
    }

    #[test]
    fn cursor_bounds_follow_sort_order() {
        let desc = Pagination::new(10).after(SurrogateId::new(2));
        assert!(desc.is_past_cursor(SurrogateId::new(1)));
        assert!(!desc.is_past_cursor(SurrogateId::new(2)));
        assert!(!desc.is_past_cursor(SurrogateId::new(3)));

        let asc = desc.sort(SortOrder::Ascending);
        assert!(asc.is_past_cursor(SurrogateId::new(3)));
        assert!(!asc.is_past_cursor(SurrogateId::new(2)));
    }

    #[test]
    fn page_next_cursor_is_last_row() {
        let page = Page::from_rows(vec![locked(3, false), locked(2, false)]);
        assert_eq!(page.next_cursor, Some(SurrogateId::new(2)));

        let empty: Page<LockedRecord> = Page::from_rows(vec![]);
        assert_eq!(empty.next_cursor, None);
    }

    #[test]
    fn locked_filter_matches_all_present_fields() {
        let filter = LockedFilter {
            creator: Some("C1".into()),
            deleted: Some(false),
            ..Default::default()
        };
        assert!(filter.matches(&locked(1, false)));
        assert!(!filter.matches(&locked(1, true)));
        assert!(LockedFilter::default().matches(&locked(1, true)));

        let by_id = LockedFilter {
            id: Some(SurrogateId::new(2)),
            ..Default::default()
        };
        assert!(by_id.matches(&locked(2, false)));
        assert!(!by_id.matches(&locked(1, false)));
    }

    #[test]
    fn page_serializes_next_cursor() {
        let page = Page::from_rows(vec![locked(5, false)]);
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["nextCursor"], 5);
        assert_eq!(json["data"][0]["objectId"], "L5");
    }
}
