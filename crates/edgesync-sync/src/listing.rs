//! Paginated remote listings
//!
//! Stores signal more results with a truncation flag and usually a
//! continuation marker. When the marker is missing, the last key of the
//! page is used instead; a truncated page with neither a marker nor any
//! items ends pagination rather than looping.

use std::collections::BTreeMap;

use edgesync_core::{
    domain::{
        newtypes::{KeyPrefix, ObjectKey},
        records::RemoteObject,
    },
    ports::object_store::{IObjectStore, ListPage, ListRequest},
};
use tracing::{debug, info, instrument, warn};

use crate::SyncError;

/// Marker for the page after `page`, or `None` when pagination is done
fn next_marker(page: &ListPage, current: Option<&str>) -> Option<String> {
    if !page.truncated {
        return None;
    }

    let candidate = page
        .next_marker
        .clone()
        .filter(|m| !m.is_empty())
        .or_else(|| {
            let last_item = page.items.last().map(|o| o.key.as_str().to_string());
            let last_prefix = page.common_prefixes.last().cloned();
            last_item.max(last_prefix)
        });

    match candidate {
        None => {
            warn!("Listing truncated without a marker or contents, stopping");
            None
        }
        Some(marker) if Some(marker.as_str()) == current => {
            warn!(%marker, "Listing marker did not advance, stopping");
            None
        }
        Some(marker) => Some(marker),
    }
}

/// List every object whose key starts with `prefix`
///
/// A failure on any page is an error; a partial listing is never returned.
#[instrument(skip(store))]
pub async fn list_all_objects(
    store: &dyn IObjectStore,
    prefix: &str,
) -> Result<BTreeMap<ObjectKey, RemoteObject>, SyncError> {
    let mut objects = BTreeMap::new();
    let mut marker: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let request = ListRequest::new(prefix).with_marker(marker.clone());
        let page = store
            .list_objects(&request)
            .await
            .map_err(SyncError::Listing)?;
        pages += 1;
        debug!(page = pages, items = page.items.len(), truncated = page.truncated, "Listed page");

        let next = next_marker(&page, marker.as_deref());
        for object in page.items {
            objects.insert(object.key.clone(), object);
        }

        match next {
            Some(m) => marker = Some(m),
            None => break,
        }
    }

    info!(objects = objects.len(), pages, "Listed remote objects");
    Ok(objects)
}

/// List single-level "folders" directly under `prefix`
#[instrument(skip(store), fields(prefix = %prefix))]
pub async fn list_folders(
    store: &dyn IObjectStore,
    prefix: &KeyPrefix,
) -> Result<Vec<String>, SyncError> {
    let mut folders = Vec::new();
    let mut marker: Option<String> = None;

    loop {
        let request = ListRequest::new(prefix.as_dir())
            .with_delimiter("/")
            .with_marker(marker.clone());
        let page = store
            .list_objects(&request)
            .await
            .map_err(SyncError::Listing)?;

        let next = next_marker(&page, marker.as_deref());
        folders.extend(page.common_prefixes);

        match next {
            Some(m) => marker = Some(m),
            None => break,
        }
    }

    folders.sort();
    folders.dedup();
    info!(folders = folders.len(), "Listed folders");
    Ok(folders)
}
