//! Timeline item model
//!
//! Items are written by several pages with slightly different shapes, so
//! every field is optional and decoded leniently. A value that does not fit
//! its field is kept verbatim and written back as it was; unknown fields are
//! kept the same way.

use chrono::DateTime;
use serde::de::{Deserializer, Error as _};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Number, Value};
use std::str::FromStr;
use wargame_store::{Move, Phase};

/// Identity prefix length for items without an id
pub const CONTENT_PREFIX_CHARS: usize = 100;

/// Item identifier as written by pages: a number or a string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemId {
    /// Numeric id (epoch-ms based)
    Number(Number),
    /// Text id
    Text(String),
}

impl ItemId {
    /// Fresh id derived from the current time plus a random suffix
    #[must_use]
    pub fn generate(now_ms: i64) -> Self {
        Self::Text(format!("{now_ms}-{:08x}", rand::random::<u32>()))
    }

    /// Numeric id
    #[must_use]
    pub fn number(n: i64) -> Self {
        Self::Number(n.into())
    }

    /// Empty strings and zero count as "no id"
    #[must_use]
    pub fn is_absent(&self) -> bool {
        match self {
            Self::Number(n) => n.as_f64() == Some(0.0),
            Self::Text(s) => s.is_empty(),
        }
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Team owning an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Team {
    /// Player team
    Blue,
    /// Game control
    White,
    /// Ally team
    Green,
    /// Adversary team
    Red,
}

impl Team {
    /// Lowercase wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blue => "blue",
            Self::White => "white",
            Self::Green => "green",
            Self::Red => "red",
        }
    }
}

impl FromStr for Team {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blue" => Ok(Self::Blue),
            "white" => Ok(Self::White),
            "green" => Ok(Self::Green),
            "red" => Ok(Self::Red),
            other => Err(format!("unknown team '{other}'")),
        }
    }
}

impl Serialize for Team {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Team {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of timeline event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ItemType {
    /// Free note
    #[default]
    Note,
    /// Key moment
    Moment,
    /// Quote
    Quote,
    /// Request for information
    RequestInfo,
    /// Submission or request to the White Cell
    Request,
    /// Facilitator action
    Action,
    /// Facilitator observation
    Observation,
    /// White Cell ruling
    Ruling,
    /// White Cell response to BLUE
    WhiteFeedback,
    /// Notetaker submission marker
    Submission,
    /// Notetaker analysis update
    Analysis,
    /// Anything else, kept verbatim
    Other(String),
}

impl ItemType {
    /// Wire name
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Note => "note",
            Self::Moment => "moment",
            Self::Quote => "quote",
            Self::RequestInfo => "requestinfo",
            Self::Request => "request",
            Self::Action => "action",
            Self::Observation => "observation",
            Self::Ruling => "ruling",
            Self::WhiteFeedback => "white_feedback",
            Self::Submission => "submission",
            Self::Analysis => "analysis",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for ItemType {
    fn from(value: &str) -> Self {
        match value {
            "note" => Self::Note,
            "moment" => Self::Moment,
            "quote" => Self::Quote,
            "requestinfo" => Self::RequestInfo,
            "request" => Self::Request,
            "action" => Self::Action,
            "observation" => Self::Observation,
            "ruling" => Self::Ruling,
            "white_feedback" => Self::WhiteFeedback,
            "submission" => Self::Submission,
            "analysis" => Self::Analysis,
            other => Self::Other(other.to_string()),
        }
    }
}

impl Serialize for ItemType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ItemType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Self::from(text.as_str()))
    }
}

/// One timeline event
///
/// Decoding never fails for an object: a field whose value cannot be read
/// as its typed form is moved verbatim into [`Self::extra`] and written back
/// unchanged, so re-saving a record does not alter what other pages stored.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimelineItem {
    /// Stable id, when the writer assigned one
    pub id: Option<ItemId>,
    /// Move the item belongs to (`move`)
    pub move_number: Option<Move>,
    /// Phase at capture
    pub phase: Option<Phase>,
    /// Display time as written by the page
    pub time: Option<String>,
    /// Epoch milliseconds
    pub timestamp: Option<i64>,
    /// Event kind (`type`)
    pub item_type: ItemType,
    /// Headline
    pub title: Option<String>,
    /// Body
    pub content: Option<String>,
    /// Owning team
    pub team: Option<Team>,
    /// Faction tag
    pub faction: Option<String>,
    /// Debate marker
    pub marker: Option<String>,
    /// Cross references
    pub refs: Option<Value>,
    /// Fields this crate does not model, and modelled fields kept verbatim
    pub extra: Map<String, Value>,
}

/// Deduplication identity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// Writer-assigned id
    Id(String),
    /// Derived identity for items without an id
    Composite {
        /// Effective timestamp
        timestamp: i64,
        /// Team name or `unknown`
        team: String,
        /// First characters of content
        content_prefix: String,
    },
}

impl TimelineItem {
    /// Empty item of a kind
    #[must_use]
    pub fn new(item_type: ItemType) -> Self {
        Self {
            item_type,
            ..Self::default()
        }
    }

    /// With title
    #[inline]
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// With content
    #[inline]
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// With team
    #[inline]
    #[must_use]
    pub fn with_team(mut self, team: Team) -> Self {
        self.team = Some(team);
        self
    }

    /// With phase
    #[inline]
    #[must_use]
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// With id
    #[inline]
    #[must_use]
    pub fn with_id(mut self, id: ItemId) -> Self {
        self.id = Some(id);
        self
    }

    /// With epoch-ms timestamp
    #[inline]
    #[must_use]
    pub fn with_timestamp(mut self, ms: i64) -> Self {
        self.timestamp = Some(ms);
        self
    }

    /// With display time
    #[inline]
    #[must_use]
    pub fn with_time(mut self, time: impl Into<String>) -> Self {
        self.time = Some(time.into());
        self
    }

    /// With references
    #[inline]
    #[must_use]
    pub fn with_refs(mut self, refs: Value) -> Self {
        self.refs = Some(refs);
        self
    }

    /// Id, unless absent or blank
    #[must_use]
    pub fn present_id(&self) -> Option<&ItemId> {
        self.id.as_ref().filter(|id| !id.is_absent())
    }

    /// `timestamp`, else `time` parsed as RFC 3339, else 0
    #[must_use]
    pub fn effective_timestamp(&self) -> i64 {
        self.timestamp
            .filter(|ms| *ms != 0)
            .or_else(|| {
                self.time
                    .as_deref()
                    .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                    .map(|dt| dt.timestamp_millis())
            })
            .unwrap_or(0)
    }

    /// Deduplication identity
    #[must_use]
    pub fn identity(&self) -> Identity {
        if let Some(id) = self.present_id() {
            return Identity::Id(id.to_string());
        }
        Identity::Composite {
            timestamp: self.effective_timestamp(),
            team: self.team_name(),
            content_prefix: self
                .content
                .as_deref()
                .unwrap_or_default()
                .chars()
                .take(CONTENT_PREFIX_CHARS)
                .collect(),
        }
    }

    /// Lowercase team name, including one kept verbatim, else `unknown`
    #[must_use]
    pub fn team_name(&self) -> String {
        match (self.team, self.extra.get("team").and_then(Value::as_str)) {
            (Some(team), _) => team.as_str().to_string(),
            (None, Some(raw)) if !raw.trim().is_empty() => raw.trim().to_ascii_lowercase(),
            _ => "unknown".to_string(),
        }
    }

    /// Content length plus number of serialized fields
    #[must_use]
    pub fn completeness(&self) -> usize {
        let content = self.content.as_deref().map_or(0, |c| c.chars().count());
        let fields = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map.len(),
            _ => 0,
        };
        content + fields
    }

    /// Canonical JSON text, used to order otherwise equal candidates
    #[must_use]
    pub fn canonical(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl TimelineItem {
    /// Decode from a JSON object, keeping unreadable values verbatim
    #[must_use]
    pub fn from_map(mut map: Map<String, Value>) -> Self {
        let mut extra = Map::new();
        let mut take = |key: &str| map.remove(key).map(|value| (key.to_string(), value));
        let mut item = Self {
            id: decode_field(take("id"), &mut extra, |v| serde_json::from_value(v.clone()).ok()),
            move_number: decode_field(take("move"), &mut extra, |v| {
                serde_json::from_value(v.clone()).ok()
            }),
            phase: decode_field(take("phase"), &mut extra, |v| {
                (!v.is_null()).then(|| Phase::normalize(v))
            }),
            time: decode_field(take("time"), &mut extra, string),
            timestamp: decode_field(take("timestamp"), &mut extra, millis),
            item_type: decode_field(take("type"), &mut extra, |v| v.as_str().map(ItemType::from))
                .unwrap_or_default(),
            title: decode_field(take("title"), &mut extra, string),
            content: decode_field(take("content"), &mut extra, string),
            team: decode_field(take("team"), &mut extra, |v| v.as_str()?.parse().ok()),
            faction: decode_field(take("faction"), &mut extra, string),
            marker: decode_field(take("marker"), &mut extra, string),
            refs: take("refs").map(|(_, value)| value),
            extra: Map::new(),
        };
        extra.extend(map);
        item.extra = extra;
        item
    }

    /// Encode as a JSON object; verbatim values win over defaults
    #[must_use]
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        put(&mut map, "id", self.id.as_ref());
        put(&mut map, "move", self.move_number.as_ref());
        put(&mut map, "phase", self.phase.as_ref());
        put(&mut map, "time", self.time.as_ref());
        put(&mut map, "timestamp", self.timestamp.as_ref());
        map.insert("type".into(), Value::String(self.item_type.as_str().to_string()));
        put(&mut map, "title", self.title.as_ref());
        put(&mut map, "content", self.content.as_ref());
        put(&mut map, "team", self.team.as_ref());
        put(&mut map, "faction", self.faction.as_ref());
        put(&mut map, "marker", self.marker.as_ref());
        put(&mut map, "refs", self.refs.as_ref());
        for (key, value) in &self.extra {
            if key == "type" || !map.contains_key(key) {
                map.insert(key.clone(), value.clone());
            }
        }
        map
    }
}

impl Serialize for TimelineItem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_map().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TimelineItem {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Object(map) => Ok(Self::from_map(map)),
            other => Err(D::Error::custom(format!("timeline item must be an object, got {other}"))),
        }
    }
}

/// Decode an array of items, skipping entries that are not objects
#[must_use]
pub fn decode_items(value: &Value) -> Vec<TimelineItem> {
    split_items(value).0
}

/// Decode an array of items; entries that are not objects are returned
/// verbatim so a record can be written back without losing them
#[must_use]
pub fn split_items(value: &Value) -> (Vec<TimelineItem>, Vec<Value>) {
    let Some(entries) = value.as_array() else {
        return (Vec::new(), Vec::new());
    };
    let mut items = Vec::with_capacity(entries.len());
    let mut kept = Vec::new();
    for entry in entries {
        match entry {
            Value::Object(map) => items.push(TimelineItem::from_map(map.clone())),
            other => {
                tracing::warn!(entry = %other, "timeline entry is not an object, kept as stored");
                kept.push(other.clone());
            }
        }
    }
    (items, kept)
}

fn decode_field<T>(
    entry: Option<(String, Value)>,
    extra: &mut Map<String, Value>,
    decode: impl FnOnce(&Value) -> Option<T>,
) -> Option<T> {
    let (key, value) = entry?;
    let decoded = decode(&value);
    if decoded.is_none() {
        extra.insert(key, value);
    }
    decoded
}

fn put<T: Serialize>(map: &mut Map<String, Value>, key: &str, value: Option<&T>) {
    if let Some(value) = value.and_then(|v| serde_json::to_value(v).ok()) {
        map.insert(key.to_string(), value);
    }
}

fn string(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

#[allow(clippy::cast_possible_truncation)]
fn millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.parse::<i64>().ok().or_else(|| {
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.timestamp_millis())
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_mixed_shapes() {
        let item: TimelineItem = serde_json::from_value(json!({
            "id": 1_712_345_678_901_i64,
            "move": 2,
            "phase": "Adjudication",
            "timestamp": 1_712_345_678_901.75,
            "type": "white_feedback",
            "team": "BLUE",
            "content": "Response sent",
            "custom": {"k": 1}
        }))
        .unwrap();
        assert_eq!(item.phase, Some(Phase::Adjudication));
        assert_eq!(item.team, Some(Team::Blue));
        assert_eq!(item.item_type, ItemType::WhiteFeedback);
        assert_eq!(item.timestamp, Some(1_712_345_678_901));
        assert_eq!(item.extra["custom"], json!({"k": 1}));
    }

    #[test]
    fn bad_fields_are_kept_verbatim_not_fatal() {
        let raw = json!({
            "move": 9,
            "team": "purple",
            "content": 42,
            "type": "weather"
        });
        let item: TimelineItem = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(item.move_number, None);
        assert_eq!(item.team, None);
        assert_eq!(item.content, None);
        assert_eq!(item.item_type, ItemType::Other("weather".into()));
        assert_eq!(serde_json::to_value(&item).unwrap(), raw);
    }

    #[test]
    fn unreadable_type_survives_a_write_back() {
        let raw = json!({"id": "a", "type": null, "content": "lost type"});
        let item: TimelineItem = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(item.item_type, ItemType::Note);
        assert_eq!(item.present_id(), Some(&ItemId::Text("a".into())));
        assert_eq!(serde_json::to_value(&item).unwrap(), raw);

        let numeric = json!({"id": "n", "type": 3});
        let item: TimelineItem = serde_json::from_value(numeric.clone()).unwrap();
        assert_eq!(serde_json::to_value(&item).unwrap(), numeric);
    }

    #[test]
    fn verbatim_team_keeps_its_identity() {
        let item: TimelineItem =
            serde_json::from_value(json!({"timestamp": 5, "team": "Purple", "content": "odd"})).unwrap();
        match item.identity() {
            Identity::Composite { team, .. } => assert_eq!(team, "purple"),
            Identity::Id(_) => panic!("item has no id"),
        }
    }

    #[test]
    fn non_object_entries_are_split_off() {
        let (items, kept) = split_items(&json!([{"id": 1}, "stray", 7]));
        assert_eq!(items.len(), 1);
        assert_eq!(kept, vec![json!("stray"), json!(7)]);
        assert!(serde_json::from_value::<TimelineItem>(json!("stray")).is_err());
    }

    #[test]
    fn blank_ids_fall_back_to_composite_identity() {
        let item = TimelineItem::new(ItemType::Note)
            .with_id(ItemId::Text(String::new()))
            .with_timestamp(5)
            .with_content("x".repeat(150));
        match item.identity() {
            Identity::Composite {
                timestamp,
                team,
                content_prefix,
            } => {
                assert_eq!(timestamp, 5);
                assert_eq!(team, "unknown");
                assert_eq!(content_prefix.len(), CONTENT_PREFIX_CHARS);
            }
            Identity::Id(_) => panic!("blank id must not be used"),
        }
        assert!(ItemId::number(0).is_absent());
    }

    #[test]
    fn numeric_and_text_ids_share_identity() {
        let a = TimelineItem::new(ItemType::Note).with_id(ItemId::number(77));
        let b = TimelineItem::new(ItemType::Note).with_id(ItemId::Text("77".into()));
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn time_is_used_when_timestamp_missing() {
        let item = TimelineItem::new(ItemType::Note).with_time("1970-01-01T00:00:01Z");
        assert_eq!(item.effective_timestamp(), 1_000);
        let unparsable = TimelineItem::new(ItemType::Note).with_time("10:42:00 AM");
        assert_eq!(unparsable.effective_timestamp(), 0);
    }

    #[test]
    fn completeness_counts_content_and_fields() {
        let item = TimelineItem::new(ItemType::Note)
            .with_content("abcd")
            .with_team(Team::Red);
        // type, content, team
        assert_eq!(item.completeness(), 4 + 3);
    }
}
