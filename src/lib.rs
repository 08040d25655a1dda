//! Sessionmux - concurrency-safe cloud session factory.
//!
//! Sessionmux manages transient, automatically-renewing cloud credentials and
//! amortizes the cost of creating provider service clients. It serves any
//! process that authenticates many operations against a cloud API, possibly
//! under an assumed (delegated) identity, without re-authenticating or
//! rebuilding clients on every call.
//!
//! # Features
//!
//! - **Auto-renewing credentials**: assumed-role snapshots are refreshed
//!   transparently before they expire; readers never see stale credentials
//! - **Client caching**: service clients are memoized per (credential
//!   identity, service, region) and rebuilt only when the identity rotates
//! - **Fail fast**: role assumption is verified eagerly at session creation
//! - **Throttling-aware**: identity-service calls retry with backoff on
//!   throttling, and nothing else
//! - **Session decoration**: product identification metadata, write-only
//!   policy labels, and subscriber hooks on every created session
//!
//! # Quick Start
//!
//! ```no_run
//! use sessionmux::{SessionConfig, SessionFactory};
//! use sessionmux::connectors::mock::MockConnector;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> sessionmux::Result<()> {
//!     let config = SessionConfig::new()
//!         .with_region("us-east-1")
//!         .with_assume_role("arn:aws:iam::123456789012:role/Audit")
//!         .with_external_id("vendor-42");
//!
//!     // swap in connectors::aws::AwsConnector (feature "aws") for real use
//!     let factory = SessionFactory::new(config, Arc::new(MockConnector::new()));
//!
//!     let session = factory.create().await?;
//!     let ec2 = session.client("ec2").await?;
//!     println!("ec2 client ready in {}", ec2.region());
//!
//!     // drain the shared client cache at teardown
//!     factory.cache().close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Connectors
//!
//! The provider SDK boundary is the [`Connector`] trait. Built-in
//! implementations are feature-gated:
//!
//! | Connector | Feature flag | Notes |
//! |-----------|--------------|-------|
//! | Mock | `mock` (default) | In-memory, call recording, error injection |
//! | AWS | `aws` | `aws-config` + `aws-sdk-sts` backed |
//!
//! # Environment
//!
//! Read once at process start:
//!
//! - `SESSIONMUX_USE_STS_REGIONAL` ("yes"/"true"): use region-specific
//!   identity-service endpoints
//! - `SESSIONMUX_SESSION_SUFFIX`: appended to the default role session name
//!   to disambiguate co-running processes

pub mod cache;
pub mod config;
pub mod connector;
pub mod connectors;
pub mod credentials;
pub mod error;
pub mod factory;
pub mod retry;
pub mod session;
pub mod sts;
pub mod validation;

pub use cache::{ClientCache, ClientCacheKey, IdentityKey, ServiceClient};
pub use config::{SessionConfig, StsOptions};
pub use connector::{ClientConfig, ClientSpec, Connector};
pub use credentials::{CredentialSnapshot, RefreshCredentials, RefreshableCredentials};
pub use error::{ErrorKind, Result, SessionmuxError};
pub use factory::{SessionFactory, Subscriber};
pub use retry::RetryPolicy;
pub use session::{AssumedSessionBuilder, Session, UserAgent};
pub use sts::{AssumeRoleRequest, StsApi};
