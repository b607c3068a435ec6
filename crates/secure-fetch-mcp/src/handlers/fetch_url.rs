use secure_fetch::{FetchOutcome, FetchRequest, Fetcher};
use tracing::instrument;

use crate::mcp::types::{ErrorObject, FetchUrlParams};

/// Runs the `fetch_url` tool. Refusals and transport failures are part of the
/// outcome, so this only errors on malformed arguments.
#[instrument(skip(params, fetcher), fields(url = %params.url))]
pub async fn handle_fetch_url(
    params: FetchUrlParams,
    fetcher: &Fetcher,
) -> Result<FetchOutcome, ErrorObject> {
    let request: FetchRequest = params.into();
    Ok(fetcher.fetch(request).await)
}
