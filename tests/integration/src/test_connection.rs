//! Connection state machine integration tests.

#[cfg(test)]
mod tests {
    use awsconn_core::CallerIdentity;
    use awsconn_manager::ConnectionState;

    use crate::{TestConnection, next_terminal, region};

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_validate_default_profile_on_initialize() {
        let conn = TestConnection::new();
        let mut rx = conn.manager.subscribe();

        conn.manager
            .initialize(conn.credentials.factories())
            .unwrap_or_else(|e| panic!("initialize failed: {e}"));
        let state = next_terminal(&mut rx).await;

        assert!(state.is_valid(), "expected a valid connection, got {state}");
        assert!(conn.manager.active_account_id().is_some());
        assert_eq!(conn.manager.active_region().map(|r| r.id), Some("us-east-1".to_owned()));
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_track_regions_across_changes() {
        let conn = TestConnection::new();
        let mut rx = conn.manager.subscribe();
        conn.manager
            .initialize(conn.credentials.factories())
            .unwrap_or_else(|e| panic!("initialize failed: {e}"));
        assert!(next_terminal(&mut rx).await.is_valid());

        conn.manager.change_region(region("eu-west-1"));
        let state = next_terminal(&mut rx).await;

        assert!(state.is_valid(), "expected a valid connection, got {state}");
        let recent: Vec<String> = conn.manager.recent_regions().into_iter().map(|r| r.id).collect();
        assert_eq!(recent, ["eu-west-1", "us-east-1"]);
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_connect_to_local_region_without_account() {
        let conn = TestConnection::new();
        let mut rx = conn.manager.subscribe();
        conn.manager
            .initialize(conn.credentials.factories())
            .unwrap_or_else(|e| panic!("initialize failed: {e}"));
        next_terminal(&mut rx).await;

        conn.manager.change_region(region("toolkit-local-aws"));
        let state = next_terminal(&mut rx).await;

        assert!(matches!(
            state,
            ConnectionState::ValidConnection {
                identity: CallerIdentity::Local,
                ..
            }
        ));
        assert!(conn.manager.active_account_id().is_none());
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_become_incomplete_when_profile_is_removed() {
        let conn = TestConnection::new();
        let mut rx = conn.manager.subscribe();
        conn.manager
            .initialize(conn.credentials.factories())
            .unwrap_or_else(|e| panic!("initialize failed: {e}"));
        next_terminal(&mut rx).await;

        conn.credentials.remove("profile:default");
        let state = next_terminal(&mut rx).await;

        assert!(matches!(state, ConnectionState::IncompleteConfiguration));
    }
}
