//! HTTP handlers for the read and write routes in §6. Each module is a thin
//! adapter over `AppState`'s `QueryService`/`Store`/`Scheduler`/`Vault` — no SQL
//! or cache-key knowledge lives here.

pub mod blacklist;
pub mod collection;
pub mod fortinet;
pub mod stats;

pub(crate) fn validate_pagination(
    page: Option<u32>,
    limit: Option<u32>,
) -> Result<ipwatch_core::Pagination, crate::error::ApiError> {
    let page = page.unwrap_or(1);
    let limit = limit.unwrap_or(50);

    if page == 0 {
        return Err(ipwatch_core::Error::new(
            ipwatch_core::ErrorCode::ValidationFailed,
            "page must be >= 1",
        )
        .into());
    }
    if limit == 0 || limit > 1000 {
        return Err(ipwatch_core::Error::new(
            ipwatch_core::ErrorCode::ValidationFailed,
            "limit must be between 1 and 1000",
        )
        .into());
    }

    Ok(ipwatch_core::Pagination { page, limit })
}
