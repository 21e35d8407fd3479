//! Three-way reconciliation of source documents, editable containers and
//! result containers.
//!
//! Documents and containers are paired by a name-derived match key; a container
//! is paired with a result container by exact name. Every derived field is
//! recomputed from scratch on each pass.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, warn};

use crate::model::{DocumentStatus, EditableContainer, ResultContainer, SourceDocument};

/// Number of `_`-separated name segments that make up a match key.
pub const MATCH_KEY_SEGMENTS: usize = 3;

/// Which side of the matching holds a duplicated key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictSide {
    Documents,
    Containers,
}

/// A match key shared by several objects on one side. The first listed one wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchConflict {
    pub key: String,
    pub side: ConflictSide,
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub documents: Vec<SourceDocument>,
    pub containers: Vec<EditableContainer>,
    pub conflicts: Vec<MatchConflict>,
}

/// Drop a trailing `.ext` (the extension may not contain `.` or `/`).
pub fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot) => {
            let ext = &name[dot + 1..];
            if ext.is_empty() || ext.contains('/') {
                name
            } else {
                &name[..dot]
            }
        }
        None => name,
    }
}

/// First three `_`-separated segments of `name`, joined back with `_`.
pub fn match_key(name: &str) -> String {
    name.split('_')
        .take(MATCH_KEY_SEGMENTS)
        .collect::<Vec<_>>()
        .join("_")
}

pub fn document_match_key(name: &str) -> String {
    match_key(strip_extension(name))
}

fn percent(count: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((count as f64 * 100.0 / total as f64).round() as u64).min(100) as u8
}

/// Items of `container` whose name also appears in `result`.
fn completed_count(container: &EditableContainer, result: &ResultContainer) -> usize {
    let promoted: HashSet<&str> = result.files.iter().map(|f| f.name.as_str()).collect();
    container
        .files
        .iter()
        .filter(|item| promoted.contains(item.name.as_str()))
        .count()
}

/// Progress before the results area has the container: share of approved items.
/// Once it does: share of item names present there.
pub fn container_progress(container: &EditableContainer, result: Option<&ResultContainer>) -> u8 {
    let total = container.files.len();
    match result {
        Some(result) => percent(completed_count(container, result), total),
        None => {
            let approved = container.files.iter().filter(|item| item.approved).count();
            percent(approved, total)
        }
    }
}

pub fn document_status(
    container: Option<&EditableContainer>,
    result: Option<&ResultContainer>,
) -> DocumentStatus {
    let Some(container) = container else {
        return DocumentStatus::Pending;
    };
    match result {
        None => {
            if container.files.iter().any(|item| item.edited) {
                DocumentStatus::InProgress
            } else {
                DocumentStatus::Pending
            }
        }
        Some(result) => {
            let done = completed_count(container, result);
            if done == 0 {
                DocumentStatus::Pending
            } else if done < container.files.len() {
                DocumentStatus::InProgress
            } else {
                DocumentStatus::Completed
            }
        }
    }
}

fn find_conflicts(keys: &[String], ids: Vec<&str>, side: ConflictSide) -> Vec<MatchConflict> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<String>> = HashMap::new();
    for (key, id) in keys.iter().zip(ids) {
        let group = groups.entry(key.as_str()).or_default();
        if group.is_empty() {
            order.push(key.as_str());
        }
        group.push(id.to_string());
    }
    order
        .into_iter()
        .filter_map(|key| {
            let ids = groups.remove(key)?;
            (ids.len() > 1).then(|| MatchConflict {
                key: key.to_string(),
                side,
                ids,
            })
        })
        .collect()
}

pub fn reconcile(
    mut documents: Vec<SourceDocument>,
    mut containers: Vec<EditableContainer>,
    results: &[ResultContainer],
) -> Reconciliation {
    for doc in &mut documents {
        doc.matching_container_id = None;
        doc.status = DocumentStatus::Pending;
    }
    for container in &mut containers {
        container.matching_document_id = None;
        container.progress = 0;
    }

    let mut results_by_name: HashMap<&str, &ResultContainer> = HashMap::new();
    for result in results {
        results_by_name
            .entry(result.container_name.as_str())
            .or_insert(result);
    }

    let doc_keys: Vec<String> = documents
        .iter()
        .map(|d| document_match_key(&d.name).to_lowercase())
        .collect();
    let container_keys: Vec<String> = containers
        .iter()
        .map(|c| match_key(&c.name).to_lowercase())
        .collect();

    for container in &mut containers {
        let result = results_by_name.get(container.name.as_str()).copied();
        container.progress = container_progress(container, result);
    }

    for (doc, key) in documents.iter_mut().zip(&doc_keys) {
        let Some(idx) = container_keys.iter().position(|k| k == key) else {
            continue;
        };
        let container = &containers[idx];
        let result = results_by_name.get(container.name.as_str()).copied();
        doc.matching_container_id = Some(container.id.clone());
        doc.status = document_status(Some(container), result);
    }

    for (container, key) in containers.iter_mut().zip(&container_keys) {
        if let Some(idx) = doc_keys.iter().position(|k| k == key) {
            container.matching_document_id = Some(documents[idx].id.clone());
        }
    }

    let mut conflicts = find_conflicts(
        &container_keys,
        containers.iter().map(|c| c.id.as_str()).collect(),
        ConflictSide::Containers,
    );
    conflicts.extend(find_conflicts(
        &doc_keys,
        documents.iter().map(|d| d.id.as_str()).collect(),
        ConflictSide::Documents,
    ));
    for conflict in &conflicts {
        warn!(
            "match key {:?} shared by {} {:?}; first listed wins",
            conflict.key,
            conflict.ids.len(),
            conflict.side
        );
    }

    debug!(
        "reconciled documents={} containers={} results={} matched={}",
        documents.len(),
        containers.len(),
        results.len(),
        documents
            .iter()
            .filter(|d| d.matching_container_id.is_some())
            .count()
    );

    Reconciliation {
        documents,
        containers,
        conflicts,
    }
}
