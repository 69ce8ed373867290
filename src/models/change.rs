use std::collections::HashMap;

use serde::Deserialize;

/// Row-level mutation kinds delivered by the change stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ChangeKind {
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "REMOVE")]
    Remove,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Remove => "REMOVE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "REMOVE" => Some(ChangeKind::Remove),
            _ => None,
        }
    }
}

/// Poller-written fields of a stored article as seen by the change stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleImage {
    pub url: String,
    pub notifier_name: String,
    pub title: String,
    pub category: String,
    pub pubtime: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub new_image: Option<ArticleImage>,
}

/// An article that still needs to be summarized and announced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub category: String,
    pub published_at: String,
    pub title: String,
    pub link: String,
    pub notifier_name: String,
}

impl From<ArticleImage> for Candidate {
    fn from(image: ArticleImage) -> Self {
        Self {
            category: image.category,
            published_at: image.pubtime,
            title: image.title,
            link: image.url,
            notifier_name: image.notifier_name,
        }
    }
}

/// Only INSERT events start enrichment; the enrichment itself writes an
/// UPDATE, which must not loop back into the pipeline. Each candidate keeps
/// the position of its event in the batch.
pub fn candidates(events: Vec<ChangeEvent>) -> Vec<(usize, Candidate)> {
    events
        .into_iter()
        .enumerate()
        .filter_map(|(position, event)| match (event.kind, event.new_image) {
            (ChangeKind::Insert, Some(image)) => Some((position, Candidate::from(image))),
            (ChangeKind::Insert, None) => {
                tracing::warn!("INSERT event without a new image, skipping");
                None
            }
            (kind, _) => {
                tracing::debug!("skip {} event", kind.as_str());
                None
            }
        })
        .collect()
}

/// `{ "Records": [...] }` batch as delivered by a DynamoDB-style stream.
#[derive(Debug, Deserialize)]
pub struct StreamBatch {
    #[serde(rename = "Records", default)]
    pub records: Vec<StreamRecord>,
}

#[derive(Debug, Deserialize)]
pub struct StreamRecord {
    #[serde(rename = "eventName")]
    pub event_name: ChangeKind,
    #[serde(default)]
    pub dynamodb: StreamPayload,
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamPayload {
    #[serde(rename = "NewImage", default)]
    pub new_image: Option<HashMap<String, AttributeValue>>,
}

#[derive(Debug, Deserialize)]
pub struct AttributeValue {
    #[serde(rename = "S")]
    pub s: Option<String>,
}

impl StreamBatch {
    pub fn into_events(self) -> Vec<ChangeEvent> {
        self.records.into_iter().map(ChangeEvent::from).collect()
    }
}

impl From<StreamRecord> for ChangeEvent {
    fn from(record: StreamRecord) -> Self {
        let new_image = record.dynamodb.new_image.and_then(|mut attrs| {
            let mut take = |name: &str| attrs.remove(name).and_then(|v| v.s);
            Some(ArticleImage {
                url: take("url")?,
                notifier_name: take("notifier_name")?,
                title: take("title")?,
                category: take("category")?,
                pubtime: take("pubtime")?,
            })
        });
        ChangeEvent {
            kind: record.event_name,
            new_image,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(url: &str) -> ArticleImage {
        ArticleImage {
            url: url.to_string(),
            notifier_name: "aws".to_string(),
            title: format!("title of {}", url),
            category: "news".to_string(),
            pubtime: "2024-05-01T10:00:00".to_string(),
        }
    }

    #[test]
    fn only_insert_events_become_candidates() {
        let events = vec![
            ChangeEvent { kind: ChangeKind::Insert, new_image: Some(image("https://a")) },
            ChangeEvent { kind: ChangeKind::Update, new_image: Some(image("https://a")) },
            ChangeEvent { kind: ChangeKind::Remove, new_image: None },
            ChangeEvent { kind: ChangeKind::Insert, new_image: Some(image("https://b")) },
            ChangeEvent { kind: ChangeKind::Update, new_image: Some(image("https://b")) },
        ];

        let found = candidates(events);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].0, 0);
        assert_eq!(found[0].1.link, "https://a");
        assert_eq!(found[1].0, 3);
        assert_eq!(found[1].1.link, "https://b");
        assert_eq!(found[1].1.notifier_name, "aws");
    }

    #[test]
    fn parses_stream_batch_document() {
        let doc = r#"{
            "Records": [
                {
                    "eventName": "INSERT",
                    "dynamodb": {
                        "Keys": { "url": { "S": "https://example.com/x" } },
                        "NewImage": {
                            "url": { "S": "https://example.com/x" },
                            "notifier_name": { "S": "aws" },
                            "title": { "S": "X ships" },
                            "category": { "S": "What's new" },
                            "pubtime": { "S": "2024-05-01T10:00:00" },
                            "expireAt": { "N": "1714600000" }
                        }
                    }
                },
                { "eventName": "REMOVE", "dynamodb": {} }
            ]
        }"#;

        let batch: StreamBatch = serde_json::from_str(doc).unwrap();
        let events = batch.into_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].kind, ChangeKind::Remove);

        let found = candidates(events);
        assert_eq!(found.len(), 1);
        let (_, candidate) = &found[0];
        assert_eq!(candidate.title, "X ships");
        assert_eq!(candidate.category, "What's new");
        assert_eq!(candidate.published_at, "2024-05-01T10:00:00");
    }

    #[test]
    fn insert_missing_required_attribute_is_dropped() {
        let doc = r#"{ "Records": [ { "eventName": "INSERT", "dynamodb": { "NewImage": {
            "url": { "S": "https://example.com/x" }
        } } } ] }"#;
        let batch: StreamBatch = serde_json::from_str(doc).unwrap();
        assert!(candidates(batch.into_events()).is_empty());
    }
}
