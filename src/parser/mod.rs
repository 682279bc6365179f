pub mod datasets;
pub mod literal;
pub mod page;

use tracing::debug;

use crate::error::ShimError;
use datasets::Datasets;

/// Raw page text → embedded blocks + summary → normalized buckets.
/// A page that yields nothing at all is reported as `NoData`.
pub fn extract_page(url: &str, raw: &str) -> Result<Datasets, ShimError> {
    let extraction = page::extract_lines(raw.lines());
    debug!(url, blocks = extraction.blocks.len(), "extracted page");

    let datasets = Datasets::from_blocks(&extraction.blocks, extraction.summary);
    if datasets.is_empty() {
        return Err(ShimError::NoData { url: url.to_string() });
    }
    Ok(datasets)
}
