//! Directory-style browsing on top of `ObjectStore::list`

use super::{ObjectStore, StoreError, StoreResult};

/// List the immediate child "directories" of `prefix`
///
/// Every returned entry is longer than `prefix` and ends with `/`.
pub async fn list_directories(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
) -> StoreResult<Vec<String>> {
    let listing = store.list(bucket, prefix, Some("/")).await?;
    for dir in &listing.prefixes {
        check_under(bucket, prefix, dir)?;
    }
    Ok(listing.prefixes)
}

/// List every object under `prefix`, recursively
pub async fn list_files(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
) -> StoreResult<Vec<String>> {
    let listing = store.list(bucket, prefix, None).await?;
    for file in &listing.objects {
        check_under(bucket, prefix, file)?;
    }
    Ok(listing.objects)
}

/// A store that hands back names outside the queried prefix cannot be trusted
fn check_under(bucket: &str, prefix: &str, name: &str) -> StoreResult<()> {
    if name.len() <= prefix.len() || !name.starts_with(prefix) {
        return Err(StoreError::ContractViolation(format!(
            "object is expected to have prefix gs://{}/{}, got {:?}",
            bucket, prefix, name
        )));
    }
    Ok(())
}
