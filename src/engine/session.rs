// Review session state: the reconciled view plus local edits and approvals.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::catalog::{Catalog, CatalogSnapshot};
use super::fetcher::Fetcher;
use super::promote::{PromoteOutcome, Promoter};
use super::reconcile::{reconcile, MatchConflict};
use crate::error::{Result, ReviewError};
use crate::model::{
    EditableContainer, EditableItem, ItemContent, ResultContainer, ResultFile, SourceDocument,
};

/// What a client renders: the three collections after reconciliation.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewView {
    pub documents: Vec<SourceDocument>,
    pub containers: Vec<EditableContainer>,
    pub results: Vec<ResultContainer>,
    pub conflicts: Vec<MatchConflict>,
    /// Message of the last failed refresh; the collections are then the last good ones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Unix millis of the last successful refresh.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refreshed_at: Option<u64>,
}

#[derive(Default)]
struct SessionState {
    documents: Vec<SourceDocument>,
    containers: Vec<EditableContainer>,
    /// Local mirror of the results area, updated on every approval.
    results: Vec<ResultContainer>,
    conflicts: Vec<MatchConflict>,
    last_error: Option<String>,
    refreshed_at: Option<u64>,
}

impl SessionState {
    /// Replace the collections with a fresh snapshot, keeping loaded content
    /// and review flags for items that are still present.
    fn apply(&mut self, snapshot: &CatalogSnapshot) {
        let loaded_documents: HashMap<String, String> = self
            .documents
            .drain(..)
            .filter_map(|d| d.content.map(|content| (d.id, content)))
            .collect();
        let previous_items: HashMap<String, EditableItem> = self
            .containers
            .drain(..)
            .flat_map(|c| c.files)
            .map(|item| (item.id.clone(), item))
            .collect();

        self.documents = snapshot
            .documents
            .iter()
            .map(|listing| {
                let mut document = SourceDocument::from_listing(listing);
                document.content = loaded_documents.get(&listing.id).cloned();
                document
            })
            .collect();

        self.containers = snapshot
            .containers
            .iter()
            .cloned()
            .map(|mut container| {
                for item in &mut container.files {
                    if let Some(prev) = previous_items.get(&item.id) {
                        item.content = prev.content.clone();
                        item.edited = prev.edited;
                        item.approved = prev.approved;
                    }
                }
                container
            })
            .collect();

        self.results = snapshot.results.as_ref().clone();
        self.rederive();
    }

    /// Recompute matches, progress and status from the current collections.
    fn rederive(&mut self) {
        let reconciled = reconcile(
            std::mem::take(&mut self.documents),
            std::mem::take(&mut self.containers),
            &self.results,
        );
        self.documents = reconciled.documents;
        self.containers = reconciled.containers;
        self.conflicts = reconciled.conflicts;
    }

    fn item_mut(&mut self, id: &str) -> Option<&mut EditableItem> {
        self.containers
            .iter_mut()
            .flat_map(|c| c.files.iter_mut())
            .find(|item| item.id == id)
    }

    /// Record a promoted file in the local results mirror.
    fn record_result(&mut self, container_name: &str, file_name: &str, outcome: &PromoteOutcome) {
        let file = ResultFile {
            id: outcome.file_id.clone(),
            name: file_name.to_string(),
        };
        match self
            .results
            .iter_mut()
            .find(|r| r.container_name == container_name)
        {
            Some(result) => {
                result.files.retain(|f| f.name != file_name);
                result.files.push(file);
            }
            None => self.results.push(ResultContainer {
                container_id: outcome.container_id.clone(),
                container_name: container_name.to_string(),
                files: vec![file],
            }),
        }
    }

    fn view(&self) -> ReviewView {
        ReviewView {
            documents: self.documents.clone(),
            containers: self.containers.clone(),
            results: self.results.clone(),
            conflicts: self.conflicts.clone(),
            error: self.last_error.clone(),
            refreshed_at: self.refreshed_at,
        }
    }
}

pub struct ReviewSession {
    catalog: Arc<Catalog>,
    fetcher: Arc<Fetcher>,
    promoter: Arc<Promoter>,
    state: Mutex<SessionState>,
}

impl ReviewSession {
    pub fn new(catalog: Arc<Catalog>, fetcher: Arc<Fetcher>, promoter: Arc<Promoter>) -> Self {
        Self {
            catalog,
            fetcher,
            promoter,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Re-list all three collections and reconcile them.
    ///
    /// On failure the previous collections stay in place and the view carries
    /// the error message.
    pub async fn refresh(&self) -> ReviewView {
        match self.catalog.snapshot().await {
            Ok(snapshot) => {
                let mut state = self.state.lock();
                state.apply(&snapshot);
                state.last_error = None;
                state.refreshed_at = now_millis();
                info!(
                    "session refreshed: {} documents, {} containers, {} results, {} conflicts",
                    state.documents.len(),
                    state.containers.len(),
                    state.results.len(),
                    state.conflicts.len()
                );
                state.view()
            }
            Err(e) => {
                warn!("session refresh failed, keeping last view: {}", e);
                let mut state = self.state.lock();
                state.last_error = Some(e.to_string());
                state.view()
            }
        }
    }

    pub fn view(&self) -> ReviewView {
        self.state.lock().view()
    }

    /// Text of a source document, fetched on first use.
    pub async fn open_document(&self, id: &str) -> Result<String> {
        {
            let state = self.state.lock();
            let document = state
                .documents
                .iter()
                .find(|d| d.id == id)
                .ok_or_else(|| unknown("document", id))?;
            if let Some(content) = &document.content {
                return Ok(content.clone());
            }
        }

        let bytes = self.fetcher.fetch(id).await?;
        let text = String::from_utf8_lossy(&bytes).into_owned();

        let mut state = self.state.lock();
        if let Some(document) = state.documents.iter_mut().find(|d| d.id == id) {
            document.content = Some(text.clone());
        }
        Ok(text)
    }

    /// Content of an editable item; a local edit wins over the stored copy.
    pub async fn open_item(&self, id: &str) -> Result<ItemContent> {
        let name = {
            let mut state = self.state.lock();
            let item = state.item_mut(id).ok_or_else(|| unknown("item", id))?;
            if let Some(content) = &item.content {
                return Ok(content.clone());
            }
            item.name.clone()
        };

        let bytes = self.fetcher.fetch(id).await?;
        let decoded = ItemContent::decode(&name, &bytes)?;

        let mut state = self.state.lock();
        match state.item_mut(id) {
            // An edit may have landed while the fetch was in flight.
            Some(item) => Ok(item.content.get_or_insert(decoded).clone()),
            None => Ok(decoded),
        }
    }

    /// Replace an item's content locally and mark it edited.
    pub fn edit_item(&self, id: &str, content: ItemContent) -> Result<()> {
        let mut state = self.state.lock();
        let item = state.item_mut(id).ok_or_else(|| unknown("item", id))?;
        item.content = Some(content);
        item.edited = true;
        debug!("item {} edited", id);
        state.rederive();
        Ok(())
    }

    /// Promote an item into the results folder named after its container.
    pub async fn approve_item(&self, id: &str) -> Result<PromoteOutcome> {
        let (item, container_name) = {
            let state = self.state.lock();
            state
                .containers
                .iter()
                .find_map(|c| {
                    c.files
                        .iter()
                        .find(|item| item.id == id)
                        .map(|item| (item.clone(), c.name.clone()))
                })
                .ok_or_else(|| unknown("item", id))?
        };

        let outcome = self.promoter.promote(&item, &container_name).await?;

        let mut state = self.state.lock();
        if let Some(current) = state.item_mut(id) {
            current.approved = true;
        }
        state.record_result(&container_name, &item.name, &outcome);
        state.rederive();
        Ok(outcome)
    }
}

fn unknown(kind: &'static str, id: &str) -> ReviewError {
    ReviewError::UnknownItem {
        kind,
        id: id.to_string(),
    }
}

fn now_millis() -> Option<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_millis() as u64)
}
