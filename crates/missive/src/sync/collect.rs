//! Paginated collection of one endpoint

use std::collections::{HashMap, HashSet};

use log::{debug, warn};

use super::RetryPolicy;
use crate::api::{Cursor, Endpoint, PageFetcher};
use crate::error::FetchError;
use crate::models::{Record, TimeWindow};

/// Records gathered from every page of one endpoint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collected {
    /// In the order first received, one per id
    pub records: Vec<Record>,
    pub pages: usize,
    /// Records whose id had already been seen on an earlier page, not
    /// counting the overlap where a page starts with the previous page's tail
    pub duplicates: usize,
}

/// Fetch every page of `endpoint` within `window`.
///
/// Each page goes through `retry`. Records are deduplicated by `id`: a
/// repeated id keeps its first position but takes the later content.
///
/// Cursors are inclusive timestamps, so a page normally starts by repeating
/// the last record(s) of the page before it. That overlap is expected and
/// is only logged at debug level.
///
/// # Errors
/// - Whatever the fetcher returns once retries are exhausted
/// - [`FetchError::Fatal`] for a record without an `id`
/// - [`FetchError::Fatal`] if the service hands back a cursor it already gave
pub fn collect(
    fetcher: &dyn PageFetcher,
    retry: &RetryPolicy,
    endpoint: &Endpoint,
    window: &TimeWindow,
) -> Result<Collected, FetchError> {
    let mut collected = Collected::default();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut seen_cursors: HashSet<Cursor> = HashSet::new();
    let mut cursor: Option<Cursor> = None;
    let mut previous_page: HashSet<String> = HashSet::new();

    loop {
        let page = retry.execute(|| fetcher.fetch(endpoint, window, cursor.as_ref()))?;
        collected.pages += 1;
        debug!(
            "{}: page {} with {} records",
            endpoint,
            collected.pages,
            page.records.len()
        );

        let mut in_overlap = cursor.is_some();
        let mut this_page = HashSet::with_capacity(page.records.len());
        for record in page.records {
            let Some(id) = record.id() else {
                return Err(FetchError::fatal(format!(
                    "{} page {} contains a record without an id",
                    endpoint, collected.pages
                )));
            };
            in_overlap = in_overlap && previous_page.contains(&id);
            this_page.insert(id.clone());
            match positions.get(&id) {
                Some(&index) => {
                    if in_overlap {
                        debug!("{}: record {} repeated at page boundary", endpoint, id);
                    } else {
                        warn!("{}: record {} appeared on more than one page", endpoint, id);
                        collected.duplicates += 1;
                    }
                    collected.records[index] = record;
                }
                None => {
                    positions.insert(id, collected.records.len());
                    collected.records.push(record);
                }
            }
        }

        match page.next_cursor {
            None => return Ok(collected),
            Some(next) => {
                if !seen_cursors.insert(next.clone()) {
                    return Err(FetchError::fatal(format!(
                        "{} pagination did not terminate (cursor {} repeated)",
                        endpoint, next
                    )));
                }
                cursor = Some(next);
                previous_page = this_page;
            }
        }
    }
}
