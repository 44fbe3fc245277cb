use store::Transaction;

use crate::error::Result;

/// Commits `tx` when `result` is ok, rolls it back otherwise.
///
/// A failed rollback is only logged; the original error is what the caller sees.
pub async fn settle<T>(mut tx: Box<dyn Transaction>, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "rollback failed");
            }
            Err(e)
        }
    }
}
