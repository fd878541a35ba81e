use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use reqwest::StatusCode;
use serde_json::Value;
use tokio::sync::watch;

use crate::{
    error::{Error, Result},
    post::document::Document,
};

use super::remote::RemoteStore;

/// In-process document collection, used when no remote is configured.
#[derive(Debug, Clone)]
pub struct MemoryRemote {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    documents: Mutex<BTreeMap<String, Document>>,
    changes: watch::Sender<Vec<Document>>,
    sets: AtomicUsize,
    merges: AtomicUsize,
    offline: AtomicBool,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        let (changes, _) = watch::channel(vec![]);
        Self {
            inner: Arc::new(Inner {
                documents: Mutex::new(BTreeMap::new()),
                changes,
                sets: AtomicUsize::new(0),
                merges: AtomicUsize::new(0),
                offline: AtomicBool::new(false),
            }),
        }
    }
}

#[cfg(test)]
impl MemoryRemote {
    pub fn get(&self, id: &str) -> Option<Document> {
        self.documents().get(id).cloned()
    }

    /// Number of full writes accepted so far.
    pub fn set_count(&self) -> usize {
        self.inner.sets.load(Ordering::SeqCst)
    }

    /// Number of merge writes accepted so far.
    pub fn merge_count(&self) -> usize {
        self.inner.merges.load(Ordering::SeqCst)
    }

    /// Reject every request until switched back, as an unreachable store would.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }
}

impl MemoryRemote {
    fn documents(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Document>> {
        self.inner
            .documents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_online(&self) -> Result<()> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(Error::Status {
                status: StatusCode::SERVICE_UNAVAILABLE,
                url: "memory://".to_string(),
            });
        }
        Ok(())
    }

    fn write(&self, document: &Document, merge: bool) {
        let snapshot = {
            let mut documents = self.documents();
            match documents.get_mut(&document.id) {
                Some(stored) if merge => merge_value(&mut stored.fields, document.fields.clone()),
                Some(stored) => *stored = document.clone(),
                None => {
                    documents.insert(document.id.clone(), document.clone());
                }
            }
            documents.values().cloned().collect()
        };
        self.inner.changes.send_replace(snapshot);
    }
}

impl RemoteStore for MemoryRemote {
    async fn exists(&self, id: &str) -> Result<bool> {
        self.check_online()?;
        Ok(self.documents().contains_key(id))
    }

    async fn set(&self, document: &Document) -> Result<()> {
        self.check_online()?;
        self.write(document, false);
        self.inner.sets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn merge(&self, document: &Document) -> Result<()> {
        self.check_online()?;
        self.write(document, true);
        self.inner.merges.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Document>> {
        self.check_online()?;
        Ok(self.documents().values().cloned().collect())
    }

    fn watch(&self) -> watch::Receiver<Vec<Document>> {
        // every write republishes the whole collection, so a new receiver
        // already holds the current state
        self.inner.changes.subscribe()
    }
}

/// Objects are merged key by key, anything else is replaced.
fn merge_value(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(&key) {
                    Some(existing) => merge_value(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}
