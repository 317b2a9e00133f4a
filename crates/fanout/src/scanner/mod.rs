//! Concurrent ACL scanning.
//!
//! A [`Scanner`] lists a bucket in full, then fetches every object's grants
//! on a bounded [`TaskPool`] and keeps the keys whose grants satisfy a
//! predicate. [`Scanner::public_objects()`] uses [`is_public`], which answers
//! "who can read this without being the owner?".

use crate::DEFAULT_SCANNER_WORKERS;
use crate::accumulator::Accumulator;
use crate::error::{ErrorKind, Result};
use crate::report::{report_failure, submit_or_report};
use bucketfan_pool::{DiagnosticsHandle, Event, PoolConfig, TaskPool, TracingDiagnostics};
use bucketfan_storage::{AclOutcome, Grant, ListOptions, StoreHandle, is_public};
use exn::ResultExt;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Clone)]
pub struct Scanner {
    config: PoolConfig,
    diagnostics: DiagnosticsHandle,
}

impl Scanner {
    pub fn new(config: PoolConfig, diagnostics: DiagnosticsHandle) -> Self {
        Self { config, diagnostics }
    }

    /// Keys of every object readable by all users, or by any authenticated
    /// user.
    pub async fn public_objects(&self, store: &StoreHandle, options: &ListOptions) -> Result<HashSet<String>> {
        self.scan(store, options, is_public).await
    }

    /// Keys of every object whose grants satisfy `predicate`.
    ///
    /// Objects whose ACL can't be read (access denied, or any other failure)
    /// or that the pool turns away are reported to diagnostics and left out.
    ///
    /// # Errors
    /// [`Listing`](ErrorKind::Listing) if the bucket can't be listed,
    /// [`Pool`](ErrorKind::Pool) if no pool could be created.
    pub async fn scan<P>(&self, store: &StoreHandle, options: &ListOptions, predicate: P) -> Result<HashSet<String>>
    where
        P: Fn(&[Grant]) -> bool + Send + Sync + 'static,
    {
        let objects = store.list(options).await.or_raise(|| ErrorKind::Listing)?;
        let verbose = self.diagnostics.debug_enabled();
        if verbose {
            self.diagnostics.record(Event::Processing {
                container: options.bucket.clone(),
                count: objects.len(),
            });
        }
        if objects.is_empty() {
            return Ok(HashSet::new());
        }

        let pool = TaskPool::new(self.config, self.diagnostics.clone()).or_raise(|| ErrorKind::Pool)?;
        pool.report_status("Initialized");

        let matches = Accumulator::<HashSet<String>>::new();
        let predicate = Arc::new(predicate);
        for object in objects {
            if verbose {
                self.diagnostics.record(Event::Examining {
                    item: object.key.clone(),
                });
            }
            let task = evaluate(
                Arc::clone(store),
                options.bucket.clone(),
                object.key.clone(),
                Arc::clone(&predicate),
                matches.clone(),
                self.diagnostics.clone(),
            );
            submit_or_report(&pool, &object.key, task);
        }
        pool.drain().await;
        Ok(matches.into_inner())
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new(PoolConfig::new(DEFAULT_SCANNER_WORKERS), TracingDiagnostics::handle())
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner").field("config", &self.config).finish_non_exhaustive()
    }
}

async fn evaluate<P>(
    store: StoreHandle,
    bucket: String,
    key: String,
    predicate: Arc<P>,
    matches: Accumulator<HashSet<String>>,
    diagnostics: DiagnosticsHandle,
) where
    P: Fn(&[Grant]) -> bool,
{
    match AclOutcome::from(store.acl(&bucket, &key).await) {
        AclOutcome::Granted(grants) => {
            if predicate(&grants) {
                matches.push(key);
            }
        },
        AclOutcome::Denied(err) => diagnostics.record(Event::AccessDenied {
            item: key,
            message: (*err).to_string(),
        }),
        AclOutcome::Failed(err) => report_failure(&diagnostics, &key, &err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucketfan_pool::diagnostics::RecordingDiagnostics;
    use bucketfan_storage::backend::MockStore;
    use bucketfan_storage::error::ErrorKind as StorageErrorKind;
    use bucketfan_storage::{Grantee, GranteeKind, Permission};
    use rstest::rstest;

    const ALL_USERS: &str = "http://acs.amazonaws.com/groups/global/AllUsers";
    const AUTHENTICATED: &str = "http://acs.amazonaws.com/groups/global/AuthenticatedUsers";

    fn read(grantee: Grantee) -> Grant {
        Grant::new(grantee, Permission::Read)
    }

    fn user_with_uri(uri: &str) -> Grantee {
        Grantee {
            kind: GranteeKind::User,
            id: None,
            uri: Some(uri.to_string()),
            display_name: None,
        }
    }

    fn set(keys: &[&str]) -> HashSet<String> {
        keys.iter().map(|key| key.to_string()).collect()
    }

    fn scanner(workers: usize) -> (Scanner, Arc<RecordingDiagnostics>) {
        let diagnostics = RecordingDiagnostics::new();
        (Scanner::new(PoolConfig::new(workers), diagnostics.clone()), diagnostics)
    }

    #[tokio::test]
    async fn test_empty_bucket_creates_no_pool() {
        let mock = Arc::new(MockStore::default());
        let store: StoreHandle = mock.clone();
        let (scanner, diagnostics) = scanner(4);
        let found = scanner.public_objects(&store, &ListOptions::new("empty")).await.unwrap();
        assert!(found.is_empty());
        assert_eq!(mock.acl_calls(), 0);
        assert_eq!(diagnostics.status_reports(), 0);
        assert_eq!(diagnostics.shutdowns(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_public_objects() {
        let store: StoreHandle = Arc::new(
            MockStore::default()
                .with_pages("b", [vec!["everyone", "signed-in", "logs"], vec!["impostor", "private"]])
                .with_acl("b", "everyone", [read(Grantee::canonical("owner")), read(Grantee::group(ALL_USERS))])
                .with_acl("b", "signed-in", [read(Grantee::group(AUTHENTICATED))])
                .with_acl("b", "logs", [read(Grantee::group("http://acs.amazonaws.com/groups/s3/LogDelivery"))])
                .with_acl("b", "impostor", [read(user_with_uri(ALL_USERS))]),
        );
        let (scanner, diagnostics) = scanner(4);
        let found = scanner.public_objects(&store, &ListOptions::new("b")).await.unwrap();
        assert_eq!(found, set(&["everyone", "signed-in"]));
        assert_eq!(diagnostics.status_reports(), 1);
        assert_eq!(diagnostics.shutdowns(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_denied_and_failed_are_reported_differently() {
        let store: StoreHandle = Arc::new(
            MockStore::default()
                .with_objects("b", ["open", "locked", "broken"])
                .with_acl("b", "open", [read(Grantee::group("AllUsers"))])
                .with_acl("b", "locked", [read(Grantee::group("AllUsers"))])
                .with_acl("b", "broken", [read(Grantee::group("AllUsers"))])
                .with_denied("locked")
                .with_failure("broken", StorageErrorKind::Network("connection reset".to_string())),
        );
        let (scanner, diagnostics) = scanner(2);
        let found = scanner.public_objects(&store, &ListOptions::new("b")).await.unwrap();

        assert_eq!(found, set(&["open"]));
        assert_eq!(diagnostics.count(|event| matches!(event, Event::AccessDenied { item, .. } if item == "locked")), 1);
        assert_eq!(
            diagnostics.count(|event| matches!(event, Event::TaskFailed { item, trace, .. } if item == "broken" && trace.contains("connection reset"))),
            1
        );
        assert_eq!(diagnostics.count(|event| matches!(event, Event::TaskFailed { item, .. } if item == "locked")), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_saturated_pool_skips_objects() {
        let keys = ["a", "b", "c", "d"];
        let mut mock = MockStore::default().with_objects("b", keys);
        for key in keys {
            mock = mock.with_acl("b", key, [read(Grantee::group("AllUsers"))]);
        }
        let store: StoreHandle = Arc::new(mock);
        let diagnostics = RecordingDiagnostics::new();
        let scanner = Scanner::new(PoolConfig::new(1).with_queue_capacity(1), diagnostics.clone());
        let found = scanner.public_objects(&store, &ListOptions::new("b")).await.unwrap();

        assert_eq!(found, set(&["a", "b"]));
        assert_eq!(diagnostics.rejected(), vec!["c".to_string(), "d".to_string()]);
        assert_eq!(diagnostics.shutdowns(), 1);
    }

    #[tokio::test]
    async fn test_listing_failure() {
        let store: StoreHandle =
            Arc::new(MockStore::default().with_pages("b", [vec!["a"], vec!["b"]]).fail_listing_after(1));
        let (scanner, diagnostics) = scanner(2);
        let err = scanner.public_objects(&store, &ListOptions::new("b")).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Listing);
        assert_eq!(diagnostics.status_reports(), 0);
        assert_eq!(diagnostics.shutdowns(), 0);
    }

    #[rstest]
    #[case::quiet(false, 0, 0)]
    #[case::verbose(true, 1, 3)]
    #[tokio::test]
    async fn test_debug_events(#[case] verbose: bool, #[case] processing: usize, #[case] examining: usize) {
        let store: StoreHandle = Arc::new(MockStore::default().with_objects("b", ["x", "y", "z"]));
        let diagnostics = if verbose {
            RecordingDiagnostics::verbose()
        } else {
            RecordingDiagnostics::new()
        };
        let scanner = Scanner::new(PoolConfig::new(2), diagnostics.clone());
        scanner.public_objects(&store, &ListOptions::new("b")).await.unwrap();

        assert_eq!(
            diagnostics.count(|event| matches!(event, Event::Processing { container, count: 3 } if container == "b")),
            processing
        );
        assert_eq!(diagnostics.count(|event| matches!(event, Event::Examining { .. })), examining);
    }

    #[tokio::test]
    async fn test_custom_predicate() {
        let store: StoreHandle = Arc::new(
            MockStore::default()
                .with_objects("b", ["shared", "solo"])
                .with_acl("b", "shared", [Grant::new(Grantee::canonical("partner"), Permission::FullControl)])
                .with_acl("b", "solo", [Grant::new(Grantee::canonical("partner"), Permission::Read)]),
        );
        let (scanner, _diagnostics) = scanner(2);
        let found = scanner
            .scan(&store, &ListOptions::new("b"), |grants| {
                grants.iter().any(|grant| grant.permission == Permission::FullControl)
            })
            .await
            .unwrap();
        assert_eq!(found, set(&["shared"]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_objects() {
        let keys: Vec<String> = (0..1500).map(|n| format!("k{n}")).collect();
        let mut mock = MockStore::default().with_objects("b", keys.clone());
        for key in keys.iter().step_by(3) {
            mock = mock.with_acl("b", key.clone(), [read(Grantee::group("AllUsers"))]);
        }
        let mock = Arc::new(mock);
        let store: StoreHandle = mock.clone();
        let (scanner, diagnostics) = scanner(56);
        let found = scanner.public_objects(&store, &ListOptions::new("b")).await.unwrap();
        assert_eq!(found.len(), 500);
        assert!(found.contains("k0") && found.contains("k1497") && !found.contains("k1"));
        assert_eq!(mock.acl_calls(), 1500);
        assert_eq!(diagnostics.shutdowns(), 1);
    }
}
