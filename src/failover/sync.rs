//! Session state handoff between connections.

use tokio::sync::Mutex;

use crate::protocol::{Protocol, ProtocolError, Query};

/// Copy session configuration from `from` onto `to` under the
/// connection-group lock.
///
/// Copies the row limit, the isolation level when it was changed from the
/// default, the catalog when the source has one that differs, and the
/// autocommit mode. Autocommit has no dedicated call and is applied with a
/// session statement.
pub async fn sync_connection(
    lock: &Mutex<()>,
    from: Option<&dyn Protocol>,
    to: &dyn Protocol,
) -> Result<(), ProtocolError> {
    let Some(from) = from else {
        return Ok(());
    };
    let _group = lock.lock().await;

    to.set_max_rows(from.max_rows()).await?;

    let level = from.transaction_isolation();
    if !level.is_default() {
        to.set_transaction_isolation(level).await?;
    }

    if let Some(catalog) = from.catalog().filter(|c| !c.is_empty()) {
        if to.catalog().as_deref() != Some(catalog.as_str()) {
            to.set_catalog(&catalog).await?;
        }
    }

    if from.autocommit() != to.autocommit() {
        let value = if from.autocommit() { "1" } else { "0" };
        to.execute_query(&Query::new(format!("set autocommit={}", value)))
            .await?;
    }

    Ok(())
}
