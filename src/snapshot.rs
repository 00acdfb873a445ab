//! Dashboard API payloads
//!
//! Types for the three read-only endpoints the HUD polls:
//! `/api/dashboard/graph`, `/api/dashboard/telemetry` and `/api/health`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Number of items kept in the merged telemetry feed
pub const FEED_LIMIT: usize = 15;

/// A directed, labelled relation between two entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub source: String,
    pub target: String,
    #[serde(rename = "relation", alias = "label", default)]
    pub label: String,
}

/// One fetched, self-consistent graph payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Entity identifiers in first-seen order
    #[serde(deserialize_with = "entity_ids")]
    pub entities: Vec<String>,
    #[serde(default)]
    pub relations: Vec<Relation>,
}

impl Snapshot {
    /// Decode a graph payload from JSON
    pub fn from_json(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }
}

/// The backend returns entities either as a list of ids or as an object
/// keyed by id with opaque values.
#[derive(Deserialize)]
#[serde(untagged)]
enum EntitySet {
    List(Vec<String>),
    Keyed(serde_json::Map<String, serde_json::Value>),
}

fn entity_ids<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match EntitySet::deserialize(deserializer)? {
        EntitySet::List(ids) => ids,
        EntitySet::Keyed(map) => map.into_iter().map(|(id, _)| id).collect(),
    })
}

/// A finding or insight reported by an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEntry {
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: String,
}

/// Payload of `/api/dashboard/telemetry`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPayload {
    #[serde(default)]
    pub findings: Vec<TelemetryEntry>,
    #[serde(default)]
    pub insights: Vec<TelemetryEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    Finding,
    Insight,
}

/// One line of the merged telemetry feed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedItem {
    pub kind: FeedKind,
    pub agent_id: String,
    pub content: String,
    pub timestamp: String,
    /// Parsed timestamp, if the backend sent something readable
    #[serde(skip)]
    pub at: Option<DateTime<Utc>>,
}

impl TelemetryPayload {
    /// Merge findings and insights, newest first, keeping at most `limit`.
    ///
    /// Entries with unreadable timestamps sort after every dated entry and
    /// keep their arrival order among themselves.
    pub fn into_feed(self, limit: usize) -> Vec<FeedItem> {
        let tagged = self
            .findings
            .into_iter()
            .map(|e| (FeedKind::Finding, e))
            .chain(self.insights.into_iter().map(|e| (FeedKind::Insight, e)));

        let mut feed: Vec<FeedItem> = tagged
            .map(|(kind, entry)| FeedItem {
                kind,
                at: parse_timestamp(&entry.timestamp),
                agent_id: entry.agent_id,
                content: entry.content,
                timestamp: entry.timestamp,
            })
            .collect();

        // Stable sort: Some(newer) < Some(older) < None
        feed.sort_by(|a, b| match (a.at, b.at) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        feed.truncate(limit);
        feed
    }
}

/// Accepts RFC 3339 and the naive ISO form the backend emits (assumed UTC).
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: String,
}

/// Payload of `/api/health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub checks: Vec<HealthCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}
