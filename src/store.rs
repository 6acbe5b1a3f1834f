//! The document-store collaborator.
//!
//! One document per (person, day), addressed by a composite path under a
//! deployment namespace. The store is consumed through the small
//! [`DocumentStore`] contract (get, set-with-merge, watch), so the
//! session logic never sees Firestore's wire format; [`FirestoreStore`]
//! implements the contract over the Firestore REST API, encoding values
//! the same way the official clients do.
//!
//! Watches poll the document and deliver whole ledgers over a channel.
//! They are cancellable, and [`WatchSet::replace`] cancels every previous
//! watch before installing new ones: a listener from an abandoned week
//! must never race the current one, or its lazily written zero-value
//! document could overwrite real data.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::auth::FirebaseAuth;
use crate::error::{Error, Result};
use crate::models::{CoachAnalysis, DailyLedger};

pub const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com/v1";

/// Address of one person-day ledger document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerKey {
    pub user_id: String,
    pub person_id: String,
    pub date: NaiveDate,
}

impl LedgerKey {
    fn path(&self, namespace: &str) -> String {
        format!(
            "artifacts/{namespace}/users/{}/daily_ledgers/{}_{}",
            self.user_id, self.person_id, self.date
        )
    }
}

/// Address of a day's persisted coach analysis (the latest one wins).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalysisKey {
    pub user_id: String,
    pub date: NaiveDate,
}

impl AnalysisKey {
    fn path(&self, namespace: &str) -> String {
        format!(
            "artifacts/{namespace}/users/{}/coach_analysis/{}",
            self.user_id, self.date
        )
    }
}

/// A live subscription to one ledger document. Dropping it (or calling
/// [`LedgerWatch::cancel`]) stops the underlying poll task.
pub struct LedgerWatch {
    pub key: LedgerKey,
    receiver: mpsc::Receiver<DailyLedger>,
    task: JoinHandle<()>,
}

impl LedgerWatch {
    pub fn new(key: LedgerKey, receiver: mpsc::Receiver<DailyLedger>, task: JoinHandle<()>) -> Self {
        Self { key, receiver, task }
    }

    /// Wait for the next authoritative ledger value.
    pub async fn recv(&mut self) -> Option<DailyLedger> {
        self.receiver.recv().await
    }

    /// Take a pending value without waiting.
    pub fn try_recv(&mut self) -> Option<DailyLedger> {
        self.receiver.try_recv().ok()
    }

    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for LedgerWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// The watches owned by the active week window. `replace` is the only way
/// to install new ones, which makes cancel-before-subscribe structural.
#[derive(Default)]
pub struct WatchSet {
    watches: Vec<LedgerWatch>,
}

impl WatchSet {
    /// Cancel every existing watch, then adopt `watches`.
    pub fn replace(&mut self, watches: Vec<LedgerWatch>) {
        for watch in self.watches.drain(..) {
            watch.cancel();
        }
        self.watches = watches;
    }

    pub fn clear(&mut self) {
        self.replace(Vec::new());
    }

    /// Drain every pending authoritative value across all watches.
    pub fn drain_changes(&mut self) -> Vec<DailyLedger> {
        let mut changes = Vec::new();
        for watch in &mut self.watches {
            while let Some(ledger) = watch.try_recv() {
                changes.push(ledger);
            }
        }
        changes
    }

    pub fn len(&self) -> usize {
        self.watches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }
}

/// The get/set/watch contract the session depends on.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a ledger; `None` when the document does not exist yet.
    async fn get_ledger(&self, key: &LedgerKey) -> Result<Option<DailyLedger>>;

    /// Write a ledger. With `merge` only the ledger's own fields are
    /// replaced; without it the document is overwritten.
    async fn set_ledger(&self, key: &LedgerKey, ledger: &DailyLedger, merge: bool) -> Result<()>;

    /// Subscribe to changes of one ledger document.
    async fn watch_ledger(&self, key: &LedgerKey) -> Result<LedgerWatch>;

    async fn get_analysis(&self, key: &AnalysisKey) -> Result<Option<CoachAnalysis>>;

    async fn set_analysis(&self, key: &AnalysisKey, analysis: &CoachAnalysis) -> Result<()>;
}

/// Connection settings for [`FirestoreStore`].
#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub project_id: String,
    /// Deployment namespace segment of every document path.
    pub namespace: String,
    pub base_url: String,
    /// How often watches re-read their document.
    pub poll_interval: Duration,
}

impl StoreConfig {
    pub fn new(project_id: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            namespace: namespace.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct FirestoreDocument {
    fields: Option<Map<String, Value>>,
    #[serde(rename = "updateTime")]
    update_time: Option<String>,
}

/// [`DocumentStore`] over the Firestore REST API.
#[derive(Clone)]
pub struct FirestoreStore {
    client: Client,
    auth: Option<FirebaseAuth>,
    config: StoreConfig,
}

impl FirestoreStore {
    pub fn new(config: StoreConfig, auth: FirebaseAuth) -> Self {
        Self {
            client: Client::new(),
            auth: Some(auth),
            config,
        }
    }

    /// A store without authentication, for emulators and tests.
    pub fn unauthenticated(config: StoreConfig) -> Self {
        Self {
            client: Client::new(),
            auth: None,
            config,
        }
    }

    fn document_url(&self, path: &str) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents/{}",
            self.config.base_url, self.config.project_id, path
        )
    }

    async fn bearer(&self) -> Result<Option<String>> {
        match &self.auth {
            Some(auth) => Ok(Some(auth.id_token().await?)),
            None => Ok(None),
        }
    }

    async fn fetch_document(&self, path: &str) -> Result<Option<FirestoreDocument>> {
        let mut req = self.client.get(self.document_url(path));
        if let Some(token) = self.bearer().await? {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let doc = resp
                    .json()
                    .await
                    .map_err(|e| Error::store(path, format!("undecodable document: {e}")))?;
                Ok(Some(doc))
            }
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(Error::store(path, format!("GET failed: {status} - {body}")))
            }
        }
    }

    async fn patch_document(
        &self,
        path: &str,
        fields: Map<String, Value>,
        mask: Option<&[&str]>,
    ) -> Result<()> {
        let mut req = self.client.patch(self.document_url(path));
        if let Some(token) = self.bearer().await? {
            req = req.bearer_auth(token);
        }
        if let Some(paths) = mask {
            for field_path in paths {
                req = req.query(&[("updateMask.fieldPaths", *field_path)]);
            }
        }
        let resp = req.json(&json!({ "fields": fields })).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::store(path, format!("PATCH failed: {status} - {body}")));
        }
        debug!(path, "document written");
        Ok(())
    }

    fn decode_ledger(doc: &FirestoreDocument, key: &LedgerKey, path: &str) -> Result<DailyLedger> {
        let value = doc
            .fields
            .as_ref()
            .map(decode_fields)
            .unwrap_or_else(|| json!({}));
        let mut ledger: DailyLedger = serde_json::from_value(value).map_err(|e| {
            Error::store(path, format!("document does not match ledger schema: {e}"))
        })?;
        ledger.person_id = key.person_id.clone();
        ledger.date = key.date;
        Ok(ledger)
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn get_ledger(&self, key: &LedgerKey) -> Result<Option<DailyLedger>> {
        let path = key.path(&self.config.namespace);
        match self.fetch_document(&path).await? {
            Some(doc) => Ok(Some(Self::decode_ledger(&doc, key, &path)?)),
            None => Ok(None),
        }
    }

    async fn set_ledger(&self, key: &LedgerKey, ledger: &DailyLedger, merge: bool) -> Result<()> {
        let path = key.path(&self.config.namespace);
        let value = serde_json::to_value(ledger)
            .map_err(|e| Error::store(&path, format!("unencodable ledger: {e}")))?;
        let fields = encode_fields(&value);
        let mask: Vec<&str> = fields.keys().map(String::as_str).collect();
        self.patch_document(&path, fields.clone(), merge.then_some(mask.as_slice()))
            .await
    }

    async fn watch_ledger(&self, key: &LedgerKey) -> Result<LedgerWatch> {
        let (tx, rx) = mpsc::channel(16);
        let store = self.clone();
        let watch_key = key.clone();
        let poll = self.config.poll_interval;

        let task = tokio::spawn(async move {
            let path = watch_key.path(&store.config.namespace);
            let mut last_seen: Option<String> = None;
            loop {
                match store.fetch_document(&path).await {
                    Ok(Some(doc)) => {
                        if doc.update_time != last_seen {
                            last_seen = doc.update_time.clone();
                            match FirestoreStore::decode_ledger(&doc, &watch_key, &path) {
                                Ok(ledger) => {
                                    if tx.send(ledger).await.is_err() {
                                        break;
                                    }
                                }
                                Err(error) => warn!(%error, path, "skipping undecodable change"),
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(error) => warn!(%error, path, "watch poll failed"),
                }
                tokio::time::sleep(poll).await;
            }
        });

        Ok(LedgerWatch::new(key.clone(), rx, task))
    }

    async fn get_analysis(&self, key: &AnalysisKey) -> Result<Option<CoachAnalysis>> {
        let path = key.path(&self.config.namespace);
        let Some(doc) = self.fetch_document(&path).await? else {
            return Ok(None);
        };
        let value = doc
            .fields
            .as_ref()
            .map(decode_fields)
            .unwrap_or_else(|| json!({}));
        let analysis = serde_json::from_value(value)
            .map_err(|e| Error::store(&path, format!("document does not match analysis schema: {e}")))?;
        Ok(Some(analysis))
    }

    async fn set_analysis(&self, key: &AnalysisKey, analysis: &CoachAnalysis) -> Result<()> {
        let path = key.path(&self.config.namespace);
        let value = serde_json::to_value(analysis)
            .map_err(|e| Error::store(&path, format!("unencodable analysis: {e}")))?;
        self.patch_document(&path, encode_fields(&value), None).await
    }
}

/// Encode a plain JSON object into Firestore's typed field map.
pub(crate) fn encode_fields(value: &Value) -> Map<String, Value> {
    let mut fields = Map::new();
    if let Some(object) = value.as_object() {
        for (k, v) in object {
            fields.insert(k.clone(), encode_value(v));
        }
    }
    fields
}

fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(_) => json!({ "mapValue": { "fields": encode_fields(value) } }),
    }
}

/// Decode a Firestore typed field map back into a plain JSON object.
pub(crate) fn decode_fields(fields: &Map<String, Value>) -> Value {
    let mut object = Map::new();
    for (k, v) in fields {
        object.insert(k.clone(), decode_value(v));
    }
    Value::Object(object)
}

fn decode_value(value: &Value) -> Value {
    let Some(object) = value.as_object() else {
        return value.clone();
    };
    let Some((tag, inner)) = object.iter().next() else {
        return Value::Null;
    };
    match tag.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" | "doubleValue" | "stringValue" | "timestampValue" => inner.clone(),
        // Firestore sends integers as decimal strings.
        "integerValue" => inner
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .map(|n| json!(n))
            .unwrap_or_else(|| inner.clone()),
        "arrayValue" => {
            let items = inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode_value).collect())
                .unwrap_or_default();
            Value::Array(items)
        }
        "mapValue" => inner
            .get("fields")
            .and_then(Value::as_object)
            .map(decode_fields)
            .unwrap_or_else(|| json!({})),
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_encoding_round_trips() {
        let original = json!({
            "consumedTotal": 812.5,
            "expendedTotal": 200,
            "consumptionLog": [
                { "id": "a", "kcal": 500.5, "processingLevel": "natural", "note": null }
            ],
            "nested": { "deep": { "flag": true } }
        });

        let encoded = encode_fields(&original);
        assert_eq!(encoded["consumedTotal"]["doubleValue"], 812.5);
        assert_eq!(encoded["expendedTotal"]["integerValue"], "200");

        let decoded = decode_fields(&encoded);
        assert_eq!(decoded, original);
    }

    #[test]
    fn ledger_paths_compose_the_composite_key() {
        let key = LedgerKey {
            user_id: "u1".into(),
            person_id: "valentin".into(),
            date: NaiveDate::from_ymd_opt(2025, 11, 26).unwrap(),
        };
        assert_eq!(
            key.path("tracker"),
            "artifacts/tracker/users/u1/daily_ledgers/valentin_2025-11-26"
        );
    }
}
