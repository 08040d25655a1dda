//! End-to-end factory and session behavior over the mock connector.

#![cfg(feature = "mock")]

use sessionmux::connectors::mock::{MockClient, MockConnector};
use sessionmux::{
    AssumedSessionBuilder, ClientConfig, ErrorKind, RetryPolicy, Session, SessionConfig,
    SessionFactory, SessionmuxError, StsOptions,
};
use std::sync::{Arc, Mutex};

const TEST_ROLE: &str = "arn:aws:iam::123456789012:role/Test";

fn assumed_factory(connector: Arc<MockConnector>) -> SessionFactory {
    let config = SessionConfig::new()
        .with_region("us-east-1")
        .with_assume_role(TEST_ROLE)
        .with_session_name("tester");
    SessionFactory::new(config, connector)
}

fn direct_factory(connector: Arc<MockConnector>) -> SessionFactory {
    let config = SessionConfig::new().with_region("us-east-1");
    SessionFactory::new(config, connector)
}

#[tokio::test]
async fn create_performs_one_initial_refresh() {
    let connector = Arc::new(MockConnector::new());
    let factory = assumed_factory(connector.clone());

    let session = factory.create().await.unwrap();

    assert_eq!(connector.sts().calls(), 1);

    let snapshot = session.credentials().await.unwrap().unwrap();
    assert_eq!(snapshot.access_key_id, "AKIAMOCK0");
    // still within the refresh margin, no second call
    assert_eq!(connector.sts().calls(), 1);

    let request = connector.sts().last_request().unwrap();
    assert_eq!(request.role_arn, TEST_ROLE);
    assert_eq!(request.role_session_name, "tester");
}

#[tokio::test]
async fn session_policy_and_external_id_reach_the_request() {
    let connector = Arc::new(MockConnector::new());
    let config = SessionConfig::new()
        .with_region("us-east-1")
        .with_assume_role(TEST_ROLE)
        .with_session_name("tester")
        .with_external_id("vendor-42")
        .with_session_policy(serde_json::json!({
            "Version": "2012-10-17",
            "Statement": [{"Effect": "Allow", "Action": "ec2:Describe*", "Resource": "*"}],
        }));
    let factory = SessionFactory::new(config, connector.clone());

    factory.create().await.unwrap();

    let request = connector.sts().last_request().unwrap();
    assert_eq!(request.external_id.as_deref(), Some("vendor-42"));
    assert!(request.policy.unwrap().contains("ec2:Describe*"));
}

#[tokio::test]
async fn opting_out_of_assumption_makes_a_direct_session() {
    let connector = Arc::new(MockConnector::new());
    let factory = assumed_factory(connector.clone());

    let session = factory.create_with(false, None).await.unwrap();

    assert_eq!(connector.sts().calls(), 0);
    assert!(session.credentials().await.unwrap().is_none());
    assert_eq!(session.region(), Some("us-east-1"));
}

#[tokio::test]
async fn rejected_assumption_fails_session_creation() {
    let connector = Arc::new(MockConnector::new());
    connector
        .sts()
        .push_error(SessionmuxError::Authorization("access denied".into()));
    let factory = assumed_factory(connector.clone());

    let err = factory.create().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert!(err.to_string().contains(TEST_ROLE));
}

#[tokio::test]
async fn throttled_assumption_is_retried() {
    let connector = Arc::new(MockConnector::new());
    connector
        .sts()
        .push_error(SessionmuxError::Throttling("Rate exceeded".into()));
    connector
        .sts()
        .push_error(SessionmuxError::Throttling("Rate exceeded".into()));

    let cache = Arc::new(sessionmux::ClientCache::new());
    let base = Session::direct(connector.clone(), cache, None, None, "us-east-1");

    let session = AssumedSessionBuilder::new(TEST_ROLE, "tester")
        .with_retry(
            RetryPolicy::on_throttling().with_base_delay(std::time::Duration::from_millis(1)),
        )
        .build(&base)
        .await
        .unwrap();

    assert_eq!(connector.sts().calls(), 3);
    assert!(session.credentials().await.unwrap().is_some());
}

#[tokio::test]
async fn regional_endpoint_honors_the_process_flag() {
    // flag disabled: global endpoint even with a target region
    let connector = Arc::new(MockConnector::new());
    let config = SessionConfig::new()
        .with_region("eu-west-1")
        .with_assume_role(TEST_ROLE)
        .with_sts_options(StsOptions::regional(false));
    SessionFactory::new(config, connector.clone())
        .create()
        .await
        .unwrap();

    let build = connector.sts_builds().pop().unwrap();
    assert_eq!(build.region, None);
    assert_eq!(build.endpoint, None);

    // flag enabled: region-specific endpoint
    let connector = Arc::new(MockConnector::new());
    let config = SessionConfig::new()
        .with_region("eu-west-1")
        .with_assume_role(TEST_ROLE)
        .with_sts_options(StsOptions::regional(true));
    SessionFactory::new(config, connector.clone())
        .create()
        .await
        .unwrap();

    let build = connector.sts_builds().pop().unwrap();
    assert_eq!(build.region.as_deref(), Some("eu-west-1"));
    assert_eq!(build.endpoint.as_deref(), Some("https://sts.eu-west-1.amazonaws.com"));
}

#[tokio::test]
async fn per_region_sessions_fill_distinct_cache_entries() {
    let connector = Arc::new(MockConnector::new());
    let factory = direct_factory(connector.clone());

    let west = factory.create_with(true, Some("us-west-2")).await.unwrap();
    let east = factory.create_with(true, Some("us-east-1")).await.unwrap();

    let west_client = west.client("ec2").await.unwrap();
    let east_client = east.client("ec2").await.unwrap();

    assert_eq!(west_client.region(), "us-west-2");
    assert_eq!(east_client.region(), "us-east-1");
    assert_eq!(factory.cache().len().await, 2);
    assert_eq!(connector.clients_built(), 2);
}

#[tokio::test]
async fn repeated_acquisition_shares_one_client() {
    let connector = Arc::new(MockConnector::new());
    let factory = assumed_factory(connector.clone());
    let session = factory.create().await.unwrap();

    let first = session.client("ec2").await.unwrap();
    let second = session.client("ec2").await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(connector.clients_built(), 1);
    assert_eq!(factory.cache().len().await, 1);
}

#[tokio::test]
async fn custom_config_bypasses_the_cache() {
    let connector = Arc::new(MockConnector::new());
    let factory = direct_factory(connector.clone());
    let session = factory.create().await.unwrap();

    let config = ClientConfig::new().with_endpoint("http://localhost:4566");
    let first = session.client_with("ec2", None, Some(&config)).await.unwrap();
    let second = session.client_with("ec2", None, Some(&config)).await.unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(connector.clients_built(), 2);
    assert!(factory.cache().is_empty().await);

    let handle = first.as_any().downcast_ref::<MockClient>().unwrap();
    assert_eq!(
        handle.config().unwrap().endpoint.as_deref(),
        Some("http://localhost:4566")
    );
}

#[tokio::test]
async fn rotated_credentials_orphan_old_cache_entries() {
    let connector = Arc::new(MockConnector::new());
    // every generated snapshot is already expired, so each read refreshes
    connector.sts().set_ttl(chrono::Duration::seconds(-1));

    let cache = Arc::new(sessionmux::ClientCache::new());
    let base = Session::direct(connector.clone(), cache.clone(), None, None, "us-east-1");
    let session = AssumedSessionBuilder::new(TEST_ROLE, "tester")
        .with_refresh_margin(chrono::Duration::zero())
        .build(&base)
        .await
        .unwrap();

    let first = session.client("ec2").await.unwrap();
    let second = session.client("ec2").await.unwrap();

    // the snapshot rotated between acquisitions: new key, new client
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(cache.len().await, 2);
    assert!(connector.sts().calls() >= 3);
}

#[tokio::test]
async fn fresh_credentials_are_not_refreshed_on_read() {
    let connector = Arc::new(MockConnector::new());
    let cache = Arc::new(sessionmux::ClientCache::new());
    let base = Session::direct(connector.clone(), cache, None, None, "us-east-1");
    let session = AssumedSessionBuilder::new(TEST_ROLE, "tester")
        .with_refresh_margin(chrono::Duration::zero())
        .build(&base)
        .await
        .unwrap();

    session.client("ec2").await.unwrap();
    session.client("ec2").await.unwrap();

    // only the eager seed hit the identity service
    assert_eq!(connector.sts().calls(), 1);
}

#[tokio::test]
async fn close_releases_every_cached_handle_once() {
    let connector = Arc::new(MockConnector::new());
    let factory = direct_factory(connector.clone());
    let session = factory.create().await.unwrap();

    let ec2 = session.client("ec2").await.unwrap();
    let s3 = session.client("s3").await.unwrap();

    factory.cache().close().await;

    for handle in [&ec2, &s3] {
        let client = handle.as_any().downcast_ref::<MockClient>().unwrap();
        assert_eq!(client.close_count(), 1);
    }
    assert!(factory.cache().is_empty().await);

    // close on an empty cache is a no-op
    factory.cache().close().await;
    let client = ec2.as_any().downcast_ref::<MockClient>().unwrap();
    assert_eq!(client.close_count(), 1);
}

#[tokio::test]
async fn construction_failure_is_not_cached() {
    let connector = Arc::new(MockConnector::new());
    let factory = direct_factory(connector.clone());
    let session = factory.create().await.unwrap();

    connector.fail_next_client(SessionmuxError::Configuration("invalid region".into()));
    let err = session.client("ec2").await.unwrap_err();
    assert!(matches!(err, SessionmuxError::ClientConstruction { .. }));
    assert!(factory.cache().is_empty().await);

    // next call constructs successfully
    session.client("ec2").await.unwrap();
    assert_eq!(factory.cache().len().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_acquisition_constructs_once() {
    let connector = Arc::new(MockConnector::new());
    let factory = assumed_factory(connector.clone());
    let session = Arc::new(factory.create().await.unwrap());

    let mut handles = Vec::new();
    for _ in 0..16 {
        let session = session.clone();
        handles.push(tokio::spawn(async move { session.client("ec2").await.unwrap() }));
    }

    let mut clients = Vec::new();
    for handle in handles {
        clients.push(handle.await.unwrap());
    }

    assert_eq!(connector.clients_built(), 1);
    for client in &clients[1..] {
        assert!(Arc::ptr_eq(&clients[0], client));
    }
}

#[tokio::test]
async fn subscribers_run_in_order_and_replace_wholesale() {
    let connector = Arc::new(MockConnector::new());
    let mut factory = direct_factory(connector);

    let log = Arc::new(Mutex::new(Vec::new()));
    let first = log.clone();
    let second = log.clone();
    factory.set_subscribers(vec![
        Box::new(move |_s: &mut Session| first.lock().unwrap().push("first")),
        Box::new(move |_s: &mut Session| second.lock().unwrap().push("second")),
    ]);

    factory.create().await.unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);

    // replacement is not additive
    let third = log.clone();
    factory.set_subscribers(vec![Box::new(move |_s: &mut Session| {
        third.lock().unwrap().push("third")
    })]);

    factory.create().await.unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
}

#[tokio::test]
async fn identification_metadata_reaches_built_clients() {
    let connector = Arc::new(MockConnector::new());
    let mut factory = direct_factory(connector.clone());
    factory.set_policy_name("ec2-audit");

    let session = factory.create().await.unwrap();
    let client = session.client("ec2").await.unwrap();

    let mock = client.as_any().downcast_ref::<MockClient>().unwrap();
    assert_eq!(
        mock.user_agent().to_string(),
        format!("sessionmux/{} policy#ec2-audit", env!("CARGO_PKG_VERSION"))
    );
}

#[tokio::test]
async fn identification_metadata_reaches_the_identity_service_build() {
    let connector = Arc::new(MockConnector::new());
    let factory = assumed_factory(connector.clone());

    factory.create().await.unwrap();

    let build = connector.sts_builds().pop().unwrap();
    assert_eq!(build.user_agent.name, "sessionmux");
}

#[tokio::test]
async fn policy_label_lands_in_identification_metadata() {
    let connector = Arc::new(MockConnector::new());
    let mut factory = direct_factory(connector);

    let session = factory.create().await.unwrap();
    assert_eq!(session.user_agent().name, "sessionmux");
    assert!(session.user_agent().extra.is_none());

    factory.set_policy_name("ec2-audit");
    let session = factory.create().await.unwrap();
    assert_eq!(session.user_agent().extra.as_deref(), Some("policy#ec2-audit"));
}
