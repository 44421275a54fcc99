use tokio_util::sync::CancellationToken;

/// Cooperative, set-once stop signal shared by one batch.
///
/// Checked before a row starts and between attempts. A request already in
/// flight is never interrupted; it drains to completion.
#[derive(Debug, Clone, Default)]
pub struct CancellationController {
    token: CancellationToken,
}

impl CancellationController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_shared_and_sticky() {
        let controller = CancellationController::new();
        let clone = controller.clone();
        assert!(!clone.is_cancelled());
        controller.request_cancel();
        controller.request_cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_future_wakes_waiters() {
        let controller = CancellationController::new();
        let waiter = controller.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        controller.request_cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
