use lodge_core::{CoreError, CoreResult};
use std::future::Future;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Runs `fut` until it finishes, `cancel` fires, or `deadline` passes,
/// whichever comes first. The losing future is dropped.
pub async fn guarded<T, F>(cancel: &CancellationToken, deadline: Instant, fut: F) -> CoreResult<T>
where
    F: Future<Output = CoreResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CoreError::Cancelled),
        res = tokio::time::timeout_at(deadline, fut) => match res {
            Ok(inner) => inner,
            Err(_) => Err(CoreError::DeadlineExceeded),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_already_cancelled_wins() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let deadline = Instant::now() + Duration::from_secs(5);

        let res = guarded(&cancel, deadline, async { Ok(1) }).await;
        assert_eq!(res, Err(CoreError::Cancelled));
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let cancel = CancellationToken::new();
        let deadline = Instant::now() + Duration::from_millis(10);

        let res: CoreResult<()> = guarded(&cancel, deadline, async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(())
        })
        .await;
        assert_eq!(res, Err(CoreError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_completes_normally() {
        let cancel = CancellationToken::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        assert_eq!(guarded(&cancel, deadline, async { Ok("done") }).await, Ok("done"));
    }
}
