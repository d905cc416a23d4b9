//! End-to-end migration scenarios against in-memory gateways

use migrate::{
    Endpoint, ErrorCategory, GatewayError, JobIntent, JobStatus, JobStore, MemoryGateway,
    MemoryJobStore, Orchestrator, OutcomeKind, ProgressCallback, ProgressSnapshot, ResourceKind,
    ResourceNode, ResourceOutcome, ResourceRef, RetryPolicy, Settings,
};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

fn edge() -> Endpoint {
    Endpoint::new("edge-org", "prod")
}

fn x() -> Endpoint {
    Endpoint::new("x-org", "prod")
}

fn intent() -> JobIntent {
    JobIntent::new(edge(), x())
}

fn fast_settings() -> Settings {
    Settings {
        retry: RetryPolicy::new(3, Duration::from_millis(1), 1.0),
        ..Settings::default()
    }
}

struct Harness {
    source: Arc<MemoryGateway>,
    target: Arc<MemoryGateway>,
    store: Arc<MemoryJobStore>,
    orchestrator: Arc<Orchestrator>,
}

impl Harness {
    fn new(settings: Settings) -> Self {
        Self::with_target(MemoryGateway::new(), settings)
    }

    fn with_target(target: MemoryGateway, settings: Settings) -> Self {
        let source = Arc::new(MemoryGateway::new());
        let target = Arc::new(target);
        let store = Arc::new(MemoryJobStore::new());
        let orchestrator = Arc::new(Orchestrator::new(
            source.clone(),
            target.clone(),
            target.clone(),
            store.clone(),
            settings,
        ));
        Self {
            source,
            target,
            store,
            orchestrator,
        }
    }

    fn add(&self, kind: ResourceKind, payload: Value) -> ResourceRef {
        self.source.insert_payload(&edge(), kind, payload).unwrap()
    }

    fn run(&self, intent: JobIntent) -> (String, JobStatus) {
        let job = self.orchestrator.create_job("test", intent).unwrap();
        let status = self.orchestrator.start(&job.id).unwrap();
        (job.id, status)
    }

    /// A small but complete organization
    fn seed(&self) {
        self.add(
            ResourceKind::TargetServer,
            json!({"name": "orders-backend", "host": "orders.internal", "port": 8443, "sslInfo": {"enabled": true}}),
        );
        self.add(ResourceKind::Kvm, json!({"name": "settings"}));
        self.add(ResourceKind::SharedFlow, json!({"name": "auth", "policies": []}));
        self.add(
            ResourceKind::Proxy,
            json!({
                "name": "orders",
                "target_servers": ["orders-backend"],
                "policies": [
                    {"name": "KVM-settings", "type": "KeyValueMapOperations"},
                    {"name": "FC-auth", "type": "FlowCallout", "sharedFlowBundle": "auth"},
                    {"name": "Validate", "type": "SOAPMessageValidation"}
                ]
            }),
        );
        self.add(ResourceKind::ApiProduct, json!({"name": "gold", "proxies": ["orders"]}));
        self.add(
            ResourceKind::Developer,
            json!({"email": "dev@example.com", "firstName": "Dev"}),
        );
        self.add(
            ResourceKind::DeveloperApp,
            json!({"name": "mobile", "developerEmail": "dev@example.com", "apiProducts": ["gold"]}),
        );
    }
}

#[test]
fn full_migration_completes() {
    let harness = Harness::new(fast_settings());
    harness.seed();

    let (id, status) = harness.run(intent());
    assert_eq!(status, JobStatus::Completed);

    let job = harness.store.load(&id).unwrap();
    assert_eq!(job.total_resources, 7);
    assert_eq!(job.completed_resources, 7);
    assert_eq!(job.failed_resources, 0);
    assert!(job.started_at.is_some());
    assert!(job.completed_at.is_some());
    assert_eq!(harness.target.write_count(), 7);

    let proxy = harness
        .target
        .get("x-org", &ResourceRef::org(ResourceKind::Proxy, "orders"))
        .unwrap();
    assert_eq!(proxy.payload["policies"].as_array().unwrap().len(), 2);
    assert!(job.warnings.iter().any(|w| w.contains("SOAPMessageValidation")));

    let backend = harness
        .target
        .get(
            "x-org",
            &ResourceRef::env(ResourceKind::TargetServer, "orders-backend", "prod"),
        )
        .unwrap();
    assert_eq!(backend.payload["protocol"], "HTTPS");
}

#[test]
fn second_run_is_idempotent() {
    let harness = Harness::new(fast_settings());
    harness.seed();

    let (_, first) = harness.run(intent());
    assert_eq!(first, JobStatus::Completed);
    let writes = harness.target.write_count();

    let (id, second) = harness.run(intent());
    assert_eq!(second, JobStatus::Completed);

    let job = harness.orchestrator.job(&id).unwrap();
    assert_eq!(job.completed_resources, job.total_resources);
    assert_eq!(job.failed_resources, 0);
    assert_eq!(harness.target.write_count(), writes);
    assert!(job.outcomes.iter().all(|o| o.kind == OutcomeKind::Unchanged));
}

#[test]
fn single_failure_is_isolated() {
    let harness = Harness::new(fast_settings());
    for name in ["a", "b", "c", "d"] {
        harness.add(ResourceKind::Kvm, json!({"name": name}));
    }
    let failing = ResourceRef::env(ResourceKind::Kvm, "c", "prod");
    harness.target.fail_writes(
        failing.clone(),
        GatewayError::Conflict {
            message: "locked".into(),
        },
    );

    let (id, status) = harness.run(intent());
    assert_eq!(status, JobStatus::PartiallyFailed);

    let job = harness.orchestrator.job(&id).unwrap();
    assert_eq!(job.failed_resources, 1);
    assert_eq!(job.completed_resources, 3);
    assert_eq!(harness.target.write_count(), 4);
    assert_eq!(
        job.outcome(&failing).unwrap().category,
        Some(ErrorCategory::Conflict)
    );
    assert_eq!(job.errors.iter().filter(|e| e.contains("kvm/c@prod")).count(), 1);
}

#[test]
fn dependents_of_failed_resource_are_still_attempted() {
    let harness = Harness::new(fast_settings());
    let ts1 = harness.add(
        ResourceKind::TargetServer,
        json!({"name": "ts1", "host": "h", "port": 80}),
    );
    let p1 = harness.add(ResourceKind::Proxy, json!({"name": "p1", "target_servers": ["ts1"]}));
    harness.add(ResourceKind::Kvm, json!({"name": "unrelated"}));
    harness.target.fail_writes(
        ts1.clone(),
        GatewayError::Validation {
            message: "rejected".into(),
        },
    );

    let order = harness.orchestrator.plan(&intent()).unwrap();
    assert_eq!(order.level_of(&ts1), Some(0));
    assert_eq!(order.level_of(&p1), Some(1));

    let (id, status) = harness.run(intent());
    assert_eq!(status, JobStatus::PartiallyFailed);

    let job = harness.orchestrator.job(&id).unwrap();
    assert_eq!(job.failed_resources, 2);
    let p1_outcome = job.outcome(&p1).unwrap();
    assert_eq!(p1_outcome.kind, OutcomeKind::Failed);
    assert_eq!(p1_outcome.category, Some(ErrorCategory::NotFound));
    assert!(p1_outcome.message.as_deref().unwrap().contains("ts1"));
}

#[test]
fn app_naming_developer_by_id_runs_after_it() {
    let harness = Harness::new(fast_settings());
    let developer = harness.add(
        ResourceKind::Developer,
        json!({"email": "dev@example.com", "developerId": "abc123"}),
    );
    let app = harness.add(
        ResourceKind::DeveloperApp,
        json!({"name": "mobile", "developerId": "abc123"}),
    );

    let order = harness.orchestrator.plan(&intent()).unwrap();
    assert!(order.warnings.is_empty());
    assert_eq!(order.level_of(&developer), Some(0));
    assert_eq!(order.level_of(&app), Some(1));

    let (_, status) = harness.run(intent());
    assert_eq!(status, JobStatus::Completed);
    assert!(harness.target.get("x-org", &app).is_some());
}

#[test]
fn everything_failing_fails_the_job() {
    let harness = Harness::new(fast_settings());
    let ts1 = harness.add(
        ResourceKind::TargetServer,
        json!({"name": "ts1", "host": "h", "port": 80}),
    );
    harness.add(ResourceKind::Proxy, json!({"name": "p1", "target_servers": ["ts1"]}));
    harness.target.fail_writes(
        ts1,
        GatewayError::Auth {
            message: "token expired".into(),
        },
    );

    let (id, status) = harness.run(intent());
    assert_eq!(status, JobStatus::Failed);
    assert_eq!(harness.orchestrator.job(&id).unwrap().failed_resources, 2);
}

#[test]
fn transient_errors_are_retried() {
    let harness = Harness::new(fast_settings());
    let kvm = harness.add(ResourceKind::Kvm, json!({"name": "flaky"}));
    harness.target.fail_writes_times(
        kvm,
        GatewayError::Transient {
            message: "timeout".into(),
        },
        2,
    );

    let (_, status) = harness.run(intent());
    assert_eq!(status, JobStatus::Completed);
    assert_eq!(harness.target.write_count(), 3);
}

#[test]
fn exhausted_retries_are_recorded() {
    let harness = Harness::new(fast_settings());
    let kvm = harness.add(ResourceKind::Kvm, json!({"name": "down"}));
    harness.target.fail_writes(
        kvm.clone(),
        GatewayError::Transient {
            message: "503".into(),
        },
    );

    let (id, status) = harness.run(intent());
    assert_eq!(status, JobStatus::Failed);
    assert_eq!(harness.target.write_count(), 3);
    let job = harness.orchestrator.job(&id).unwrap();
    assert_eq!(
        job.outcome(&kvm).unwrap().category,
        Some(ErrorCategory::Transient)
    );
}

#[test]
fn dry_run_makes_no_writes() {
    let harness = Harness::new(fast_settings());
    harness.seed();

    let (id, status) = harness.run(intent().dry_run(true));
    assert_eq!(status, JobStatus::Completed);
    assert_eq!(harness.target.write_count(), 0);

    let job = harness.orchestrator.job(&id).unwrap();
    assert_eq!(job.completed_resources, 7);
    assert!(job.outcomes.iter().all(|o| o.kind == OutcomeKind::Planned));
    assert!(job.outcomes.iter().all(|o| o.changes > 0));
}

#[test]
fn kind_filter_limits_the_job() {
    let harness = Harness::new(fast_settings());
    harness.seed();

    let (id, status) = harness.run(intent().with_kinds([ResourceKind::Kvm, ResourceKind::TargetServer]));
    assert_eq!(status, JobStatus::Completed);
    let job = harness.orchestrator.job(&id).unwrap();
    assert_eq!(job.total_resources, 2);
}

#[test]
fn dependency_outside_filter_is_a_warning() {
    let harness = Harness::new(fast_settings());
    harness.seed();

    let order = harness
        .orchestrator
        .plan(&intent().with_kinds([ResourceKind::Proxy]))
        .unwrap();
    assert_eq!(order.total_resources(), 1);
    assert_eq!(order.warnings.len(), 3);
}

#[test]
fn cycle_fails_the_job_before_any_work() {
    let harness = Harness::new(fast_settings());
    let a = ResourceRef::org(ResourceKind::SharedFlow, "a");
    let b = ResourceRef::org(ResourceKind::SharedFlow, "b");
    harness.source.insert(
        "edge-org",
        ResourceNode::new(a.clone(), json!({"name": "a"})).depends_on(b.clone()),
    );
    harness.source.insert(
        "edge-org",
        ResourceNode::new(b.clone(), json!({"name": "b"})).depends_on(a.clone()),
    );
    harness.add(ResourceKind::Kvm, json!({"name": "innocent"}));

    let (id, status) = harness.run(intent());
    assert_eq!(status, JobStatus::Failed);
    assert_eq!(harness.target.write_count(), 0);

    let job = harness.orchestrator.job(&id).unwrap();
    assert!(job.completed_at.is_some());
    assert!(job.errors[0].contains("shared_flow/a"));
    assert!(job.errors[0].contains("shared_flow/b"));
    assert!(!job.errors[0].contains("innocent"));
}

/// Cancels the running job as soon as its first resource is recorded
#[derive(Default)]
struct CancelAfterFirst {
    orchestrator: OnceLock<Weak<Orchestrator>>,
    job_id: Mutex<Option<String>>,
    fired: AtomicBool,
}

impl ProgressCallback for CancelAfterFirst {
    fn on_job_start(&self, job_id: &str, _total: usize) {
        *self.job_id.lock().unwrap() = Some(job_id.to_string());
    }

    fn on_level_start(&self, _level: usize, _count: usize) {}

    fn on_resource_complete(&self, _outcome: &ResourceOutcome) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        let id = self.job_id.lock().unwrap().clone().unwrap();
        let orchestrator = self.orchestrator.get().and_then(Weak::upgrade).unwrap();
        orchestrator.cancel(&id, "operator request").unwrap();
    }

    fn on_job_complete(&self, _progress: &ProgressSnapshot) {}
}

#[test]
fn cancellation_stops_new_work() {
    let source = Arc::new(MemoryGateway::new());
    let target = Arc::new(MemoryGateway::new());
    for i in 0..10 {
        source
            .insert_payload(&edge(), ResourceKind::Kvm, json!({"name": format!("map-{i}")}))
            .unwrap();
    }

    let canceller = Arc::new(CancelAfterFirst::default());
    let orchestrator = Arc::new(
        Orchestrator::new(
            source,
            target.clone(),
            target.clone(),
            Arc::new(MemoryJobStore::new()),
            Settings {
                jobs: 1,
                ..fast_settings()
            },
        )
        .with_progress(canceller.clone()),
    );
    assert!(canceller.orchestrator.set(Arc::downgrade(&orchestrator)).is_ok());

    let job = orchestrator.create_job("cancel me", intent()).unwrap();
    let status = orchestrator.start(&job.id).unwrap();

    assert_eq!(status, JobStatus::Failed);
    // one worker thread, so nothing else started after the first write
    assert_eq!(target.write_count(), 1);

    let job = orchestrator.job(&job.id).unwrap();
    assert_eq!(job.completed_resources, 1);
    assert!(job.errors.iter().any(|e| e.contains("operator request")));
    assert_eq!(
        orchestrator.cancel(&job.id, "too late").unwrap(),
        JobStatus::Failed
    );
}

#[test]
fn cancelled_pending_job_never_starts() {
    let harness = Harness::new(fast_settings());
    harness.add(ResourceKind::Kvm, json!({"name": "cfg"}));

    let job = harness.orchestrator.create_job("never", intent()).unwrap();
    assert_eq!(
        harness.orchestrator.cancel(&job.id, "changed my mind").unwrap(),
        JobStatus::Failed
    );
    assert_eq!(harness.orchestrator.start(&job.id).unwrap(), JobStatus::Failed);
    assert_eq!(harness.target.write_count(), 0);
}

#[test]
fn concurrent_jobs_are_independent() {
    let harness = Harness::new(Settings {
        jobs: 2,
        ..fast_settings()
    });
    harness.seed();
    harness
        .source
        .insert_payload(&Endpoint::new("edge-org", "test"), ResourceKind::Kvm, json!({"name": "test-only"}))
        .unwrap();

    let prod = harness.orchestrator.create_job("prod", intent()).unwrap();
    let test = harness
        .orchestrator
        .create_job(
            "test",
            JobIntent::new(Endpoint::new("edge-org", "test"), Endpoint::new("x-org", "test"))
                .with_kinds([ResourceKind::Kvm]),
        )
        .unwrap();

    let workers = [
        Arc::clone(&harness.orchestrator).spawn(&prod.id).unwrap(),
        Arc::clone(&harness.orchestrator).spawn(&test.id).unwrap(),
    ];
    for worker in workers {
        assert_eq!(worker.join().unwrap().unwrap(), JobStatus::Completed);
    }

    assert_eq!(harness.orchestrator.job(&prod.id).unwrap().total_resources, 7);
    assert_eq!(harness.orchestrator.job(&test.id).unwrap().total_resources, 1);
    assert_eq!(harness.store.list().unwrap().len(), 2);
}

#[test]
fn progress_and_logs_reflect_the_run() {
    let harness = Harness::new(fast_settings());
    harness.seed();

    let (id, _) = harness.run(intent());
    let progress = harness.orchestrator.progress(&id).unwrap();
    assert_eq!(progress.status, JobStatus::Completed);
    assert_eq!(progress.percentage, 100.0);
    assert!(progress.logs.len() <= 10);

    let logs = harness.orchestrator.logs(&id).unwrap();
    assert!(logs.logs.iter().all(|l| l.starts_with('[')));
    assert!(logs.logs.iter().any(|l| l.contains("SUCCESS: created proxy/orders")));
    for warning in &logs.warnings {
        assert!(logs.logs.iter().any(|l| l.ends_with(warning.as_str())));
    }
}
