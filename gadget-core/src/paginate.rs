//! Follows a cursor-paginated listing to the end.

use tracing::{debug, error, info};

use crate::contract::{FetchError, PageRequest, PageSource, ResultSet};

/// Fetches every page reachable from `initial` and returns all items in
/// arrival order.
///
/// Stops on the first page that has no cursor or no items. Pages are fetched
/// one after another because cursors must be followed in order. The first
/// failure aborts the listing and nothing collected so far is returned.
pub async fn fetch_all<S>(source: &S, initial: PageRequest) -> Result<ResultSet, FetchError>
where
    S: PageSource + ?Sized,
{
    let mut results = ResultSet::new();
    let mut request = initial;
    let mut page_number = 1usize;

    loop {
        let page = match source.fetch_page(&request).await {
            Ok(page) => page,
            Err(e) => {
                error!(error = %e, page = page_number, request = request.as_str(), "Page fetch failed, aborting listing");
                return Err(e);
            }
        };

        let size = page.items.len();
        debug!(page = page_number, items = size, has_next = page.next.is_some(), "Fetched results page");

        if size == 0 {
            break;
        }
        results.extend(page.items);

        match page.next {
            Some(cursor) => {
                request = PageRequest::Cursor(cursor);
                page_number += 1;
            }
            None => break,
        }
    }

    info!(pages = page_number, total = results.len(), "Listing complete");
    Ok(results)
}
