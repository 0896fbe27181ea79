//! Integration tests for chained stores over both backends.

use auditor_core::coord::{
    cache_key, lock_key, Coordinator, LockOptions, LockService, LockToken, MemoryLockService,
    MemoryTailCache, TailCache, TailEntry,
};
use auditor_core::engine::{DocumentClient, EmbeddedDocumentDb, EmbeddedKeyRangeDb};
use auditor_core::schema::set_text;
use auditor_core::{
    document_store, new_store, new_store_with, partitioned_store, AuditEvent, BackendKind,
    ChainBackend, ChainIssue, ChainedStore, Deadline, DocumentAdapter, FieldKind, LedgerConfig,
    LedgerError, LedgerResult, Record, SchemaBuilder, SharedServices, Store, Value,
};
use chrono::{TimeZone, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn event(customer: &str, name: &str) -> AuditEvent {
    AuditEvent::new(customer, "auth", "session", name)
}

/// Cursor selecting the first page of `customer`'s chain.
fn first_page(kind: BackendKind, customer: &str) -> Option<AuditEvent> {
    kind.is_partitioned()
        .then(|| AuditEvent::cursor(customer, None))
}

fn patient_locks() -> LockOptions {
    LockOptions::default()
        .retry_count(10_000)
        .retry_delay(Duration::from_millis(1))
}

const BOTH: [BackendKind; 2] = [BackendKind::Document, BackendKind::Partitioned];

#[test]
fn login_then_logout() {
    for kind in BOTH {
        let store = new_store::<AuditEvent>(&LedgerConfig::new(kind)).unwrap();

        let mut login = event("acme", "login");
        store.save(&mut login).unwrap();
        assert_eq!(login.hash.len(), 64);
        assert_eq!(login.previous_hash, "");

        let mut logout = event("acme", "logout");
        store.save(&mut logout).unwrap();
        assert_eq!(logout.previous_hash, login.hash);
        assert!(logout.timestamp > login.timestamp);

        let cursor = first_page(kind, "acme");
        let page = store.read(10, cursor.as_ref()).unwrap();
        assert_eq!(page, vec![logout, login], "{kind}");
    }
}

#[test]
fn sequential_saves_form_a_valid_chain() {
    for kind in BOTH {
        let store = new_store::<AuditEvent>(&LedgerConfig::new(kind)).unwrap();
        let mut previous = String::new();
        for i in 0..20 {
            let mut e = event("acme", &format!("e{i}"));
            store.save(&mut e).unwrap();
            assert_eq!(e.previous_hash, previous);
            previous = e.hash;
        }

        let report = store
            .verify(first_page(kind, "acme").as_ref(), 7, Deadline::never())
            .unwrap();
        assert!(report.is_valid(), "{kind}: {:?}", report.issues);
        assert_eq!(report.checked, 20);
    }
}

#[test]
fn pages_of_one_walk_the_whole_chain() {
    for kind in BOTH {
        let store = new_store::<AuditEvent>(&LedgerConfig::new(kind)).unwrap();
        let mut saved = Vec::new();
        for i in 0..5 {
            let mut e = event("acme", &format!("e{i}"));
            store.save(&mut e).unwrap();
            saved.push(e);
        }

        let mut cursor = first_page(kind, "acme");
        let mut walked = Vec::new();
        loop {
            let page = store.read(1, cursor.as_ref()).unwrap();
            assert!(page.len() <= 1);
            let Some(last) = page.into_iter().next() else {
                break;
            };
            cursor = Some(last.clone());
            walked.push(last);
        }

        saved.reverse();
        assert_eq!(walked, saved, "{kind}");
    }
}

#[test]
fn non_positive_limit_uses_default() {
    let config = LedgerConfig::new(BackendKind::Document).default_limit(3);
    let store = new_store::<AuditEvent>(&config).unwrap();
    for i in 0..5 {
        store.save(&mut event("acme", &format!("e{i}"))).unwrap();
    }
    assert_eq!(store.read(0, None).unwrap().len(), 3);
    assert_eq!(store.read(-1, None).unwrap().len(), 3);
    assert_eq!(store.read(4, None).unwrap().len(), 4);
}

#[test]
fn partitions_chain_independently() {
    let store = new_store::<AuditEvent>(&LedgerConfig::new(BackendKind::Partitioned)).unwrap();

    let mut a1 = event("acme", "login");
    let mut g1 = event("globex", "login");
    let mut a2 = event("acme", "logout");
    store.save(&mut a1).unwrap();
    store.save(&mut g1).unwrap();
    store.save(&mut a2).unwrap();

    assert_eq!(g1.previous_hash, "");
    assert_eq!(a2.previous_hash, a1.hash);

    let acme = store
        .read(10, Some(&AuditEvent::cursor("acme", None)))
        .unwrap();
    assert_eq!(acme, vec![a2, a1]);

    let mut anonymous = event("", "login");
    assert!(matches!(
        store.save(&mut anonymous),
        Err(LedgerError::MissingPartition { .. })
    ));
    assert!(matches!(
        store.read(10, None),
        Err(LedgerError::MissingPartition { .. })
    ));
}

#[test]
fn document_store_is_one_global_chain() {
    let store = new_store::<AuditEvent>(&LedgerConfig::new(BackendKind::Document)).unwrap();
    let mut a = event("acme", "login");
    let mut g = event("globex", "login");
    store.save(&mut a).unwrap();
    store.save(&mut g).unwrap();
    assert_eq!(g.previous_hash, a.hash);
}

#[test]
fn caller_supplied_hash_is_rejected() {
    let store = new_store::<AuditEvent>(&LedgerConfig::new(BackendKind::Document)).unwrap();
    let mut forged = event("acme", "login");
    forged.previous_hash = "00".repeat(32);
    assert!(matches!(
        store.save(&mut forged),
        Err(LedgerError::Validation { .. })
    ));
    assert!(store.read(10, None).unwrap().is_empty());
}

#[test]
fn explicit_sort_must_follow_tail() {
    for kind in BOTH {
        let store = new_store::<AuditEvent>(&LedgerConfig::new(kind)).unwrap();
        let later = Utc.timestamp_opt(2_000_000_000, 0).unwrap();
        let earlier = Utc.timestamp_opt(1_000_000_000, 0).unwrap();

        let mut first = event("acme", "login").at(later);
        store.save(&mut first).unwrap();
        assert_eq!(first.timestamp, Some(later));

        let mut stale = event("acme", "logout").at(earlier);
        assert!(matches!(
            store.save(&mut stale),
            Err(LedgerError::OutOfOrder { .. })
        ));
        assert!(stale.hash.is_empty());

        // a stamped record lands after the future-dated tail
        let mut next = event("acme", "logout");
        store.save(&mut next).unwrap();
        assert!(next.timestamp.unwrap() > later);
    }
}

#[test]
fn closed_store_refuses_work() {
    let store = new_store::<AuditEvent>(&LedgerConfig::new(BackendKind::Document)).unwrap();
    store.close().unwrap();
    store.close().unwrap();
    assert!(store.is_closed());
    assert!(matches!(
        store.save(&mut event("acme", "login")),
        Err(LedgerError::Closed)
    ));
    assert!(matches!(store.read(10, None), Err(LedgerError::Closed)));
}

#[test]
fn expired_deadline_fails_without_writing() {
    let store = new_store::<AuditEvent>(&LedgerConfig::new(BackendKind::Document)).unwrap();
    let expired = Deadline::after(Duration::ZERO);
    let result = store.save_until(&mut event("acme", "login"), expired);
    assert!(matches!(result, Err(LedgerError::DeadlineExceeded { .. })));
    assert!(store.read(10, None).unwrap().is_empty());
}

#[test]
fn held_cluster_lock_times_out_then_recovers() {
    let services = SharedServices::in_memory();
    let config = LedgerConfig::new(BackendKind::Document);
    let store = new_store_with::<AuditEvent>(&config, &services).unwrap();

    let intruder = LockToken::generate();
    assert!(services
        .locks
        .try_acquire("auditor.lock", &intruder, Duration::from_secs(30))
        .unwrap());

    let result = store.save_until(
        &mut event("acme", "login"),
        Deadline::after(Duration::from_millis(120)),
    );
    let err = result.unwrap_err();
    assert!(
        matches!(
            err,
            LedgerError::DeadlineExceeded { .. } | LedgerError::LockUnavailable { .. }
        ),
        "{err}"
    );
    assert!(err.is_retryable());

    assert!(services.locks.release("auditor.lock", &intruder).unwrap());
    let mut e = event("acme", "login");
    store.save(&mut e).unwrap();
    assert_eq!(e.previous_hash, "");
}

fn replicas(kind: BackendKind, count: usize) -> Vec<ChainedStore<AuditEvent>> {
    let services = SharedServices::in_memory();
    let config = LedgerConfig::new(kind).lock(patient_locks());
    match kind {
        BackendKind::Document => {
            let db = Arc::new(EmbeddedDocumentDb::in_memory());
            (0..count)
                .map(|_| document_store(db.clone(), &config, &services).unwrap())
                .collect()
        }
        BackendKind::Partitioned => {
            let db = Arc::new(EmbeddedKeyRangeDb::in_memory());
            (0..count)
                .map(|_| partitioned_store(db.clone(), &config, &services).unwrap())
                .collect()
        }
    }
}

#[test]
fn concurrent_replicas_never_fork() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 25;

    for kind in BOTH {
        let stores = replicas(kind, THREADS);
        std::thread::scope(|s| {
            for (t, store) in stores.iter().enumerate() {
                s.spawn(move || {
                    for i in 0..PER_THREAD {
                        store
                            .save(&mut event("acme", &format!("t{t}-e{i}")))
                            .unwrap();
                    }
                });
            }
        });

        let report = stores[0]
            .verify(first_page(kind, "acme").as_ref(), 50, Deadline::never())
            .unwrap();
        assert!(report.is_valid(), "{kind}: {:?}", report.issues);
        assert_eq!(report.checked, THREADS * PER_THREAD);
    }
}

#[test]
fn concurrent_saves_on_one_store() {
    let store = new_store::<AuditEvent>(
        &LedgerConfig::new(BackendKind::Partitioned).lock(patient_locks()),
    )
    .unwrap();
    std::thread::scope(|s| {
        for customer in ["acme", "globex", "initech"] {
            let store = &store;
            s.spawn(move || {
                for i in 0..20 {
                    store.save(&mut event(customer, &format!("e{i}"))).unwrap();
                }
            });
        }
    });

    for customer in ["acme", "globex", "initech"] {
        let report = store
            .verify(
                Some(&AuditEvent::cursor(customer, None)),
                100,
                Deadline::never(),
            )
            .unwrap();
        assert!(report.is_valid(), "{customer}: {:?}", report.issues);
        assert_eq!(report.checked, 20);
    }
}

#[test]
fn durable_store_resumes_chain_after_reopen() {
    for kind in BOTH {
        let dir = tempfile::tempdir().unwrap();
        let config = LedgerConfig::new(kind).data_dir(dir.path());

        let tail = {
            let store = new_store::<AuditEvent>(&config).unwrap();
            let mut last = AuditEvent::default();
            for i in 0..3 {
                last = event("acme", &format!("e{i}"));
                store.save(&mut last).unwrap();
            }
            store.close().unwrap();
            last
        };

        let store = new_store::<AuditEvent>(&config).unwrap();
        let cursor = first_page(kind, "acme");
        assert_eq!(store.read(10, cursor.as_ref()).unwrap().len(), 3);

        let mut next = event("acme", "e3");
        store.save(&mut next).unwrap();
        assert_eq!(next.previous_hash, tail.hash, "{kind}");

        let report = store
            .verify(cursor.as_ref(), 2, Deadline::never())
            .unwrap();
        assert!(report.is_valid());
        assert_eq!(report.checked, 4);
    }
}

#[test]
fn tampering_is_detected() {
    let db = Arc::new(EmbeddedDocumentDb::in_memory());
    let config = LedgerConfig::new(BackendKind::Document);
    let store =
        document_store::<AuditEvent>(db.clone(), &config, &SharedServices::in_memory()).unwrap();

    let mut saved = Vec::new();
    for i in 0..3 {
        let mut e = event("acme", &format!("e{i}"));
        store.save(&mut e).unwrap();
        saved.push(e);
    }
    assert!(store
        .verify(None, 10, Deadline::never())
        .unwrap()
        .is_valid());

    // a forged record spliced in after the real tail, keeping the link
    let schema = AuditEvent::schema().build().unwrap();
    let mut forged = saved[2].clone();
    forged.event = "grant-admin".into();
    forged.previous_hash = saved[2].hash.clone();
    forged.timestamp = Some(saved[2].timestamp.unwrap() + chrono::Duration::seconds(1));
    db.insert("audit", &schema.to_document(&forged), Deadline::never())
        .unwrap();

    let report = store.verify(None, 10, Deadline::never()).unwrap();
    assert!(!report.is_valid());
    assert!(report
        .issues
        .iter()
        .any(|i| matches!(i, ChainIssue::HashMismatch { position: 3, .. })));
}

#[test]
fn second_store_on_same_data_dir_is_refused() {
    for kind in BOTH {
        let dir = tempfile::tempdir().unwrap();
        let config = LedgerConfig::new(kind).data_dir(dir.path());

        let first = new_store::<AuditEvent>(&config).unwrap();
        let mut login = event("acme", "login");
        first.save(&mut login).unwrap();

        let err = new_store::<AuditEvent>(&config).unwrap_err();
        assert!(matches!(err, LedgerError::DirectoryLocked { .. }), "{err}");
        assert!(err.is_retryable());

        first.close().unwrap();
        let second = new_store::<AuditEvent>(&config).unwrap();
        let mut logout = event("acme", "logout");
        second.save(&mut logout).unwrap();
        assert_eq!(logout.previous_hash, login.hash, "{kind}");

        let report = second
            .verify(first_page(kind, "acme").as_ref(), 10, Deadline::never())
            .unwrap();
        assert!(report.is_valid(), "{kind}: {:?}", report.issues);
        assert_eq!(report.checked, 2);
    }
}

/// Document backend whose inserts can be switched to fail and whose tail
/// lookups can be slowed down.
struct FaultyBackend {
    inner: DocumentAdapter<AuditEvent>,
    fail_inserts: Arc<AtomicBool>,
    inserts: Arc<AtomicUsize>,
    tail_delay: Duration,
}

impl ChainBackend<AuditEvent> for FaultyBackend {
    fn chain_scope(&self, record: &AuditEvent) -> LedgerResult<Option<String>> {
        self.inner.chain_scope(record)
    }

    fn tail(&self, record: &AuditEvent, deadline: Deadline) -> LedgerResult<Option<AuditEvent>> {
        std::thread::sleep(self.tail_delay);
        self.inner.tail(record, deadline)
    }

    fn insert(&self, record: &AuditEvent, deadline: Deadline) -> LedgerResult<()> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(LedgerError::backend("connection reset"));
        }
        self.inner.insert(record, deadline)
    }

    fn query(
        &self,
        limit: usize,
        cursor: Option<&AuditEvent>,
        deadline: Deadline,
    ) -> LedgerResult<Vec<AuditEvent>> {
        self.inner.query(limit, cursor, deadline)
    }

    fn close(&self) -> LedgerResult<()> {
        self.inner.close()
    }
}

struct FaultyLedger {
    store: ChainedStore<AuditEvent>,
    locks: Arc<MemoryLockService>,
    cache: Arc<MemoryTailCache>,
    fail_inserts: Arc<AtomicBool>,
    inserts: Arc<AtomicUsize>,
}

fn faulty_ledger(lock: LockOptions, tail_delay: Duration) -> FaultyLedger {
    let schema = Arc::new(AuditEvent::schema().build().unwrap());
    let fail_inserts = Arc::new(AtomicBool::new(false));
    let inserts = Arc::new(AtomicUsize::new(0));
    let backend = FaultyBackend {
        inner: DocumentAdapter::owned(
            Arc::new(EmbeddedDocumentDb::in_memory()),
            Arc::clone(&schema),
        ),
        fail_inserts: fail_inserts.clone(),
        inserts: inserts.clone(),
        tail_delay,
    };

    let locks = Arc::new(MemoryLockService::new());
    let cache = Arc::new(MemoryTailCache::new());
    let config = LedgerConfig::new(BackendKind::Document).lock(lock);
    let coordinator = Coordinator::new(locks.clone(), cache.clone(), config.lock, config.cache_ttl);
    FaultyLedger {
        store: ChainedStore::new(schema, Box::new(backend), coordinator, &config),
        locks,
        cache,
        fail_inserts,
        inserts,
    }
}

fn cached_hash(cache: &MemoryTailCache) -> Option<String> {
    cache
        .get(&cache_key(None))
        .unwrap()
        .map(|bytes| TailEntry::decode(&bytes).unwrap().hash)
}

#[test]
fn failed_insert_leaves_no_trace() {
    let ledger = faulty_ledger(LockOptions::default(), Duration::ZERO);
    let mut login = event("acme", "login");
    ledger.store.save(&mut login).unwrap();
    assert_eq!(cached_hash(&ledger.cache), Some(login.hash.clone()));

    ledger.fail_inserts.store(true, Ordering::SeqCst);
    let mut logout = event("acme", "logout");
    let err = ledger.store.save(&mut logout).unwrap_err();
    assert!(matches!(err, LedgerError::Backend { .. }), "{err}");

    // the caller's record, the cache, the locks and the chain are untouched
    assert!(logout.hash.is_empty());
    assert!(logout.previous_hash.is_empty());
    assert!(logout.timestamp.is_none());
    assert_eq!(cached_hash(&ledger.cache), Some(login.hash.clone()));
    assert!(!ledger.locks.is_held(&lock_key(None)));
    assert_eq!(ledger.store.read(10, None).unwrap(), vec![login.clone()]);

    // the next save finds the real tail through the backend
    ledger.fail_inserts.store(false, Ordering::SeqCst);
    ledger.cache.invalidate(&cache_key(None)).unwrap();
    ledger.store.save(&mut logout).unwrap();
    assert_eq!(logout.previous_hash, login.hash);
    assert_eq!(cached_hash(&ledger.cache), Some(logout.hash.clone()));
    assert!(ledger
        .store
        .verify(None, 10, Deadline::never())
        .unwrap()
        .is_valid());
}

#[test]
fn lapsed_lease_aborts_before_insert() {
    let ledger = faulty_ledger(
        LockOptions::default().ttl(Duration::from_millis(30)),
        Duration::from_millis(80),
    );

    let err = ledger
        .store
        .save_until(&mut event("acme", "login"), Deadline::never())
        .unwrap_err();
    assert!(
        matches!(&err, LedgerError::DeadlineExceeded { operation } if operation == "cluster lock lease"),
        "{err}"
    );
    assert_eq!(ledger.inserts.load(Ordering::SeqCst), 0);
    assert!(ledger.store.read(10, None).unwrap().is_empty());
    assert_eq!(cached_hash(&ledger.cache), None);
}

/// A record whose hash column holds at most 16 characters.
#[derive(Debug, Clone, Default)]
struct NarrowHash {
    seq: i64,
    hash: String,
    previous_hash: String,
}

impl Record for NarrowHash {
    fn schema() -> SchemaBuilder<Self> {
        SchemaBuilder::<Self>::new("narrow")
            .field(
                "seq",
                FieldKind::Integer,
                "sort",
                |r| Value::Integer(r.seq),
                |r, v| match v {
                    Value::Null => {
                        r.seq = 0;
                        true
                    }
                    Value::Integer(n) => {
                        r.seq = n;
                        true
                    }
                    _ => false,
                },
            )
            .field(
                "hash",
                FieldKind::Text,
                "hash",
                |r| Value::text(r.hash.clone()),
                |r, v| match v {
                    Value::Null => {
                        r.hash.clear();
                        true
                    }
                    Value::Text(t) if t.len() <= 16 => {
                        r.hash = t;
                        true
                    }
                    _ => false,
                },
            )
            .field(
                "previous_hash",
                FieldKind::Text,
                "previoushash",
                |r| Value::text(r.previous_hash.clone()),
                |r, v| set_text(&mut r.previous_hash, v),
            )
    }
}

#[test]
fn rejected_hash_fails_the_save() {
    let store = new_store::<NarrowHash>(&LedgerConfig::new(BackendKind::Document)).unwrap();
    let mut record = NarrowHash {
        seq: 1,
        ..NarrowHash::default()
    };
    let err = store.save(&mut record).unwrap_err();
    assert!(matches!(err, LedgerError::Serialization { .. }), "{err}");
    assert!(record.hash.is_empty());
    assert!(store.read(10, None).unwrap().is_empty());
}
