use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Position of an event in the source's history.
///
/// Opaque to the indexer: it is only ever handed back to the source to
/// resume strictly after it. Serialized the way the chain RPC does, with
/// `eventSeq` as a decimal string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventId {
    /// Digest of the transaction that emitted the event.
    pub tx_digest: String,

    /// Index of the event within its transaction.
    #[serde(with = "u64_string")]
    pub event_seq: u64,
}

impl EventId {
    /// Creates a new event id.
    pub fn new(tx_digest: impl Into<String>, event_seq: u64) -> Self {
        Self {
            tx_digest: tx_digest.into(),
            event_seq,
        }
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.tx_digest, self.event_seq)
    }
}

/// A raw event as delivered by the source.
///
/// `event_type` is the fully qualified `<package>::<module>::<Name>` type,
/// possibly followed by generic arguments. The payload stays undecoded
/// until a handler maps it onto one of its known shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    /// Position of this event.
    pub id: EventId,

    /// Fully qualified event type.
    #[serde(rename = "type")]
    pub event_type: String,

    /// Address of the transaction sender.
    #[serde(default)]
    pub sender: String,

    /// Event payload as JSON.
    pub parsed_json: serde_json::Value,

    /// Milliseconds since the epoch at which the event was emitted.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "opt_u64_string"
    )]
    pub timestamp_ms: Option<u64>,
}

impl RawEvent {
    /// Creates a new raw event without a timestamp.
    pub fn new(
        id: EventId,
        event_type: impl Into<String>,
        sender: impl Into<String>,
        parsed_json: serde_json::Value,
    ) -> Self {
        Self {
            id,
            event_type: event_type.into(),
            sender: sender.into(),
            parsed_json,
            timestamp_ms: None,
        }
    }

    /// Returns the event type with any generic arguments removed.
    fn base_type(&self) -> &str {
        match self.event_type.find('<') {
            Some(idx) => &self.event_type[..idx],
            None => &self.event_type,
        }
    }

    /// The `<package>::<module>` that declared this event.
    pub fn origin(&self) -> Option<&str> {
        self.base_type().rsplit_once("::").map(|(origin, _)| origin)
    }

    /// The bare event name, e.g. `LockCreated`.
    pub fn tag(&self) -> Option<&str> {
        self.base_type().rsplit_once("::").map(|(_, tag)| tag)
    }
}

/// Selects which events of the source belong to a stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventFilter {
    /// Every event declared by a Move module.
    MoveModule { package: String, module: String },

    /// Events of one fully qualified type.
    MoveEventType(String),
}

impl EventFilter {
    /// Filter for every event declared by `package::module`.
    pub fn module(package: impl Into<String>, module: impl Into<String>) -> Self {
        EventFilter::MoveModule {
            package: package.into(),
            module: module.into(),
        }
    }

    /// The origin (`<package>::<module>`) every matching event must carry.
    pub fn origin(&self) -> String {
        match self {
            EventFilter::MoveModule { package, module } => format!("{package}::{module}"),
            EventFilter::MoveEventType(event_type) => {
                let base = event_type.split('<').next().unwrap_or(event_type);
                base.rsplit_once("::")
                    .map(|(origin, _)| origin.to_string())
                    .unwrap_or_default()
            }
        }
    }

    /// Returns true if the event belongs to this filter's stream.
    pub fn matches(&self, event: &RawEvent) -> bool {
        match self {
            EventFilter::MoveModule { .. } => event.origin() == Some(self.origin().as_str()),
            EventFilter::MoveEventType(event_type) => event.base_type() == event_type,
        }
    }
}

impl std::fmt::Display for EventFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventFilter::MoveModule { package, module } => write!(f, "{package}::{module}"),
            EventFilter::MoveEventType(event_type) => f.write_str(event_type),
        }
    }
}

/// Direction in which a page of events is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventOrder {
    /// Oldest first.
    #[default]
    Ascending,
    /// Newest first.
    Descending,
}

impl EventOrder {
    /// Whether the order is descending, as the RPC expects it.
    pub fn is_descending(&self) -> bool {
        matches!(self, EventOrder::Descending)
    }
}

/// One page of events returned by a source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPage {
    /// Events in the requested order.
    #[serde(rename = "data")]
    pub events: Vec<RawEvent>,

    /// Position to resume after on the next request.
    pub next_cursor: Option<EventId>,

    /// Whether the source holds more events past this page.
    #[serde(rename = "hasNextPage")]
    pub has_more: bool,
}

impl EventPage {
    /// Returns true if the page carries no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String),
}

impl NumberOrString {
    fn into_u64<E: serde::de::Error>(self) -> Result<u64, E> {
        match self {
            NumberOrString::Number(n) => Ok(n),
            NumberOrString::String(s) => s.parse().map_err(E::custom),
        }
    }
}

mod u64_string {
    use super::*;

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        NumberOrString::deserialize(deserializer)?.into_u64()
    }
}

mod opt_u64_string {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_str(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<u64>, D::Error> {
        Option::<NumberOrString>::deserialize(deserializer)?
            .map(NumberOrString::into_u64)
            .transpose()
    }
}
