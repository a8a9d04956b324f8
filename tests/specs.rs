// SPDX-License-Identifier: MIT

//! Workspace-level end-to-end scenarios, driven over a real bound
//! `TcpListener` with `reqwest` so the tests exercise the same wire
//! contract a client sees.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use flowd_adapters::container::fake::FakeContainerRuntime;
use flowd_adapters::verifier::fake::FakeImageVerifier;
use flowd_adapters::{ContainerRuntime, GitClient, ImageVerifier};
use flowd_core::{Clock, SystemClock};
use flowd_daemon::config::Config;
use flowd_daemon::metrics::Metrics;
use flowd_daemon::state::{AppState, SharedState};
use flowd_engine::{JobCatalog, JournalSink, LiveHub, RunStore};
use flowd_policy::PolicyBundle;
use flowd_sources::{GitAllow, SourceStore};
use flowd_storage::{Store, StoreOptions};
use jsonwebtoken::{encode, EncodingKey, Header};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;

const JWT_SECRET: &str = "spec-test-secret";

// ---------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------

/// A running daemon instance over a fresh, in-memory store. Dropping
/// this aborts the serving task.
struct TestServer {
    base_url: String,
    state: SharedState,
    _data_dir: tempfile::TempDir,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct ServerOptions {
    journal_max_bytes: u64,
    container_runtime: Arc<dyn ContainerRuntime>,
    image_verifier: Arc<dyn ImageVerifier>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            journal_max_bytes: 64 * 1024 * 1024,
            container_runtime: Arc::new(FakeContainerRuntime::default()),
            image_verifier: Arc::new(FakeImageVerifier::always_verified()),
        }
    }
}

async fn spawn_server(opts: ServerOptions) -> TestServer {
    let data_dir = tempfile::tempdir().expect("tempdir");
    let local_root = data_dir.path().join("sources").join("local");
    let oci_root = data_dir.path().join("sources").join("oci");
    let git_root = data_dir.path().join("sources").join("git");
    let runs_dir = data_dir.path().join("runs");
    for dir in [&local_root, &oci_root, &git_root, &runs_dir] {
        std::fs::create_dir_all(dir).expect("fixture dir");
    }

    let config = Config {
        data_dir: data_dir.path().to_path_buf(),
        jwt_secret: JWT_SECRET.to_string(),
        policy_file: None,
        env_profile: None,
        version: "test".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        extensions_ndjson: true,
        storage_max_bytes: 256 * 1024 * 1024,
        journal_max_bytes: opts.journal_max_bytes,
        idempotency_ttl_seconds: 86_400,
        kv_namespace_quota_bytes: 0,
        local_allow_roots: vec![local_root.clone()],
        git_checkout_dir: git_root.clone(),
        oci_cache_root: oci_root.clone(),
        runs_dir: runs_dir.clone(),
        container_runtime_binary: PathBuf::from("docker"),
        git_binary: PathBuf::from("git"),
        verifier_binary: PathBuf::from("cosign"),
        git_allow_hosts: Vec::new(),
        git_allow_file_roots: Vec::new(),
        shutdown_grace_seconds: 1,
    };

    let store = Store::open(StoreOptions {
        data_dir: config.data_dir.clone(),
        max_bytes: config.storage_max_bytes,
        journal_max_bytes: config.journal_max_bytes,
        ..StoreOptions::default()
    })
    .expect("open store");

    let hub = Arc::new(LiveHub::new());
    let journal_sink = JournalSink::new(store.journal(), Arc::clone(&hub));
    let git_client: Arc<dyn GitClient> = Arc::new(flowd_adapters::git::fake::FakeGitClient::new());

    let state: SharedState = Arc::new(AppState {
        config,
        store,
        runs: RunStore::new(),
        sources: SourceStore::new(),
        catalog: RwLock::new(JobCatalog::empty()),
        hub,
        journal_sink,
        policy: RwLock::new(PolicyBundle::default()),
        clock: SystemClock,
        container_runtime: opts.container_runtime,
        image_verifier: opts.image_verifier,
        git_client,
        local_allow_roots: vec![local_root],
        git_allow: vec![GitAllow::FileRoot(data_dir.path().to_path_buf())],
        oci_cache_root: oci_root,
        git_checkout_dir: git_root,
        runs_dir,
        metrics: Metrics::default(),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    let router = flowd_daemon::build_router(Arc::clone(&state));
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    TestServer { base_url: format!("http://{addr}"), state, _data_dir: data_dir, handle }
}

fn token(scopes: &[&str]) -> String {
    #[derive(Serialize)]
    struct Claims<'a> {
        sub: &'a str,
        scope: String,
        exp: usize,
    }
    let claims = Claims { sub: "test-principal", scope: scopes.join(" "), exp: 9_999_999_999 };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes())).expect("sign jwt")
}

const ALL_SCOPES: &[&str] =
    &["jobs:read", "runs:read", "runs:write", "events:read", "sources:read", "sources:write", "ruley:read", "ruley:write"];

fn auth_client() -> (reqwest::Client, String) {
    (reqwest::Client::new(), token(ALL_SCOPES))
}

/// Write a `demo` job under `root` requiring a `name` argument, shared
/// by the idempotent-replay and missing-argument scenarios below.
fn write_demo_job(root: &std::path::Path) {
    let job_dir = root.join("demo").join("config.d");
    std::fs::create_dir_all(&job_dir).expect("job dir");
    std::fs::write(
        job_dir.join("config.yaml"),
        r#"
job:
  id: demo
  name: Demo
  summary: Greets somebody
  argspec:
    args:
      - name: name
        type: string
        required: true
  steps:
    - name: greet
      command: ["echo", "hi"]
"#,
    )
    .expect("write job config");
}

// ---------------------------------------------------------------------
// Scenario 1: journal eviction/for_each
// ---------------------------------------------------------------------

#[test]
fn journal_eviction_keeps_contiguous_suffix() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::open_in_memory(StoreOptions {
        data_dir: dir.path().to_path_buf(),
        journal_max_bytes: 30,
        ..StoreOptions::default()
    })
    .expect("open store");
    let journal = store.journal();

    let first = journal.append("run-1", "step.log", br#"{"m":"alpha"}"#, 1000).expect("append alpha");
    let second = journal.append("run-1", "step.log", br#"{"m":"bravo"}"#, 1001).expect("append bravo");
    assert!(second.seq > first.seq);

    let mut seen = Vec::new();
    journal.for_each("run-1", 0, |entry| {
        seen.push(entry.seq);
        Ok(())
    }).expect("for_each");
    assert_eq!(seen, vec![second.seq]);
    assert_eq!(journal.bounds("run-1").expect("bounds"), (second.seq, second.seq));
}

// ---------------------------------------------------------------------
// Scenario 2: idempotent replay
// ---------------------------------------------------------------------

#[tokio::test]
async fn idempotent_replay_returns_same_run_once() {
    let server = spawn_server(ServerOptions::default()).await;
    write_demo_job(&server.state.local_allow_roots[0]);

    register_local_source(&server, "local", ".").await;

    let (client, bearer) = auth_client();
    let body = json!({ "job_id": "demo", "args": { "name": "Alice" } });
    let key = "aaaaaaaaaaaaaaaaaaaa";

    let first = client
        .post(format!("{}/runs", server.base_url))
        .bearer_auth(&bearer)
        .header("idempotency-key", key)
        .json(&body)
        .send()
        .await
        .expect("first create");
    assert_eq!(first.status(), reqwest::StatusCode::CREATED);
    assert!(first.headers().get("idempotent-replay").is_none());
    let first_json: Value = first.json().await.expect("first body");
    let run_id = first_json["id"].as_str().expect("run id").to_string();

    let second = client
        .post(format!("{}/runs", server.base_url))
        .bearer_auth(&bearer)
        .header("idempotency-key", key)
        .json(&body)
        .send()
        .await
        .expect("second create");
    assert_eq!(second.status(), reqwest::StatusCode::CREATED);
    assert_eq!(second.headers().get("idempotent-replay").expect("replay header"), "true");
    let second_json: Value = second.json().await.expect("second body");
    assert_eq!(second_json["id"].as_str(), Some(run_id.as_str()));

    // Give the spawned run worker a moment, then check exactly one
    // run.start landed in the journal for this run.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let journal = server.state.store.journal();
    let mut starts = 0;
    journal
        .for_each(&run_id, 0, |entry| {
            if entry.event_type == "run.start" {
                starts += 1;
            }
            Ok(())
        })
        .expect("for_each");
    assert_eq!(starts, 1);
}

// ---------------------------------------------------------------------
// Scenario 3: missing required argument
// ---------------------------------------------------------------------

#[tokio::test]
async fn plan_with_missing_required_arg_is_422() {
    let server = spawn_server(ServerOptions::default()).await;
    write_demo_job(&server.state.local_allow_roots[0]);
    register_local_source(&server, "local", ".").await;

    let (client, bearer) = auth_client();
    let resp = client
        .post(format!("{}/plans", server.base_url))
        .bearer_auth(&bearer)
        .json(&json!({ "job_id": "demo" }))
        .send()
        .await
        .expect("create plan");
    assert_eq!(resp.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = resp.json().await.expect("problem body");
    let errors = body["errors"].as_array().expect("errors array");
    assert!(errors.iter().any(|e| e["arg"] == "name"));
}

// ---------------------------------------------------------------------
// Scenario 4: SSE replay from a Last-Event-ID cursor
// ---------------------------------------------------------------------

#[tokio::test]
async fn sse_replays_events_after_cursor() {
    let server = spawn_server(ServerOptions::default()).await;
    write_demo_job(&server.state.local_allow_roots[0]);
    register_local_source(&server, "local", ".").await;

    // Seed a run directly so /runs/{id}/events accepts it, then append
    // five journal entries straight onto the store, same as scenario 1.
    let run_id = seed_run(&server, "run-X").await;
    let journal = server.state.store.journal();
    for i in 1..=5 {
        journal.append(&run_id, "step.log", format!("{{\"m\":\"step-{i}\"}}").as_bytes(), 1000 + i).expect("append");
    }

    let (client, bearer) = auth_client();
    let mut resp = client
        .get(format!("{}/runs/{}/events", server.base_url, run_id))
        .bearer_auth(&bearer)
        .header("last-event-id", "2")
        .send()
        .await
        .expect("sse request");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    let mut collected = String::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while collected.matches("\n\n").count() < 3 && tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(Duration::from_millis(200), resp.chunk()).await {
            Ok(Ok(Some(chunk))) => collected.push_str(&String::from_utf8_lossy(&chunk)),
            _ => break,
        }
    }
    assert_eq!(collected.matches("\n\n").count(), 3, "expected exactly the 3 frames after seq 2: {collected}");
    assert!(collected.contains("step-3") && collected.contains("step-4") && collected.contains("step-5"));
    assert!(!collected.contains("step-1") && !collected.contains("step-2"));
}

// ---------------------------------------------------------------------
// Scenario 5: cursor expiry
// ---------------------------------------------------------------------

#[tokio::test]
async fn sse_returns_410_for_expired_cursor() {
    let server = spawn_server(ServerOptions { journal_max_bytes: 20, ..ServerOptions::default() }).await;
    write_demo_job(&server.state.local_allow_roots[0]);
    register_local_source(&server, "local", ".").await;
    let run_id = seed_run(&server, "run-X").await;

    let journal = server.state.store.journal();
    journal.append(&run_id, "step.log", b"123456789012", 1001).expect("append 1");
    journal.append(&run_id, "step.log", b"123456789012", 1002).expect("append 2");

    let (client, bearer) = auth_client();
    let resp = client
        .get(format!("{}/runs/{}/events", server.base_url, run_id))
        .bearer_auth(&bearer)
        .header("last-event-id", "1")
        .send()
        .await
        .expect("sse request");
    assert_eq!(resp.status(), reqwest::StatusCode::GONE);
    let body: Value = resp.json().await.expect("problem body");
    assert_eq!(body["code"], "E_CURSOR_EXPIRED");
}

// ---------------------------------------------------------------------
// Scenario 6: OCI plan succeeds, run creation is 501
// ---------------------------------------------------------------------

#[tokio::test]
async fn oci_source_plans_but_cannot_run() {
    const MANIFEST_YAML: &str = r#"
apiVersion: flwd.addon/v1
kind: AddOn
metadata:
  name: Example Add-on
  id: example-addon
  version: 1.0.0
requires: {}
jobs:
  - id: build
    name: Build
    summary: Builds the add-on
    argspec:
      args: []
    steps:
      - name: run
        command: ["echo", "build"]
"#;

    let runtime = FakeContainerRuntime::new();
    runtime.with_manifest(
        "ghcr.io/example/addon:1.0.0",
        MANIFEST_YAML.as_bytes(),
        flowd_adapters::container::ImageInfo { digest: "sha256:deadbeef".to_string(), ..Default::default() },
    );
    let verifier = FakeImageVerifier::always_verified();

    let server = spawn_server(ServerOptions {
        container_runtime: runtime,
        image_verifier: Arc::new(verifier),
        ..ServerOptions::default()
    })
    .await;
    *server.state.policy.write() = PolicyBundle { allowed_registries: vec!["ghcr.io".to_string()], ..Default::default() };

    let (client, bearer) = auth_client();
    let register = client
        .post(format!("{}/sources", server.base_url))
        .bearer_auth(&bearer)
        .json(&json!({
            "name": "addon",
            "type": "oci",
            "ref": "ghcr.io/example/addon:1.0.0",
            "trusted": true,
            "verify_signatures": false,
            "profile": "secure",
        }))
        .send()
        .await
        .expect("register source");
    assert_eq!(register.status(), reqwest::StatusCode::CREATED);

    let plan_resp = client
        .post(format!("{}/plans", server.base_url))
        .bearer_auth(&bearer)
        .json(&json!({ "job_id": "addon/build" }))
        .send()
        .await
        .expect("create plan");
    assert_eq!(plan_resp.status(), reqwest::StatusCode::OK);
    let plan: Value = plan_resp.json().await.expect("plan body");
    assert_eq!(plan["container_image"], "ghcr.io/example/addon:1.0.0");
    assert_eq!(plan["image_trust"]["verified"], true);
    assert_eq!(plan["image_trust"]["resolved_digest"], "sha256:deadbeef");

    let run_resp = client
        .post(format!("{}/runs", server.base_url))
        .bearer_auth(&bearer)
        .header("idempotency-key", "bbbbbbbbbbbbbbbbbbbb")
        .json(&json!({ "job_id": "addon/build" }))
        .send()
        .await
        .expect("create run");
    assert_eq!(run_resp.status(), reqwest::StatusCode::NOT_IMPLEMENTED);
    let body: Value = run_resp.json().await.expect("problem body");
    assert_eq!(body["code"], "E_OCI_RUN_UNSUPPORTED");
}

// ---------------------------------------------------------------------
// Helpers shared across scenarios
// ---------------------------------------------------------------------

async fn register_local_source(server: &TestServer, name: &str, reference: &str) {
    let (client, bearer) = auth_client();
    let resp = client
        .post(format!("{}/sources", server.base_url))
        .bearer_auth(&bearer)
        .json(&json!({ "name": name, "type": "local", "ref": reference }))
        .send()
        .await
        .expect("register local source");
    assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
}

/// Insert a bare `Running` run directly into the `RunStore`, bypassing
/// `POST /runs`, so event-plane scenarios don't need a full job/plan
/// round trip.
async fn seed_run(server: &TestServer, run_id: &str) -> String {
    let now = server.state.now_ms();
    let run = flowd_core::run::Run::new(flowd_core::run::RunId::from(run_id.to_string()), "demo".to_string(), flowd_core::run::Executor::Host, now);
    server.state.runs.insert(run);
    run_id.to_string()
}
