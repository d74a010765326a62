//! STS identity resolver integration tests.

#[cfg(test)]
mod tests {
    use awsconn_core::{AccountId, ConnectionError};
    use awsconn_manager::{CancellationSource, IdentityResolver};

    use crate::{region, sts_resolver, test_credentials};

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_resolve_account_id() {
        let resolver = sts_resolver();
        let source = CancellationSource::new();

        let account = resolver
            .resolve_account_id(&test_credentials(), &region("us-east-1"), &source.signal())
            .await
            .unwrap_or_else(|e| panic!("GetCallerIdentity failed: {e}"));

        assert!(AccountId::new(account).is_ok());
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_default_empty_region_to_us_east_1() {
        let resolver = sts_resolver();
        let source = CancellationSource::new();

        let result = resolver
            .resolve_account_id(&test_credentials(), &region(""), &source.signal())
            .await;

        assert!(result.is_ok(), "empty region should fall back: {result:?}");
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_stop_when_cancelled() {
        let resolver = sts_resolver();
        let source = CancellationSource::new();
        let signal = source.signal();
        source.cancel();

        let result = resolver
            .resolve_account_id(&test_credentials(), &region("us-east-1"), &signal)
            .await;

        assert!(matches!(result, Err(ConnectionError::Cancelled)));
    }
}
