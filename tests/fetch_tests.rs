//! Integration tests for the fetch layer
//!
//! These tests use wiremock to create mock HTTP servers and drive the
//! `Fetcher` end-to-end against a SQLite failure store.

use coleta::config::{Config, FetcherConfig, OutputConfig, UserAgentConfig};
use coleta::fetch::{payload_file_name, FetchJob, FetchResults, Fetcher, SinkMode};
use coleta::storage::{open_shared_storage, FailureStore, SharedStore};
use coleta::{ColetaError, FailureKind, Payload, PayloadKind};
use serde_json::json;
use std::collections::HashSet;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TASK: &str = "extract_camara_frentes";

/// Creates a test configuration with fast retries
fn create_test_config(fetcher: FetcherConfig) -> Config {
    Config {
        fetcher,
        user_agent: UserAgentConfig {
            name: "coleta-test".to_string(),
            version: "0.0.1".to_string(),
            contact: "https://example.com/contact".to_string(),
        },
        output: OutputConfig {
            database_path: "unused.db".to_string(),
            extract_dir: "unused".to_string(),
        },
        tasks: vec![],
    }
}

fn fast_fetcher_config(max_attempts: u32) -> FetcherConfig {
    FetcherConfig {
        concurrency: 4,
        timeout_secs: 5,
        max_attempts,
        retry_delay_ms: 0,
        ..FetcherConfig::default()
    }
}

struct TestEnv {
    store: SharedStore,
    fetcher: Fetcher,
    _dir: TempDir,
}

impl TestEnv {
    fn new(fetcher_config: FetcherConfig) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = open_shared_storage(&dir.path().join("coleta.db")).expect("Failed to open store");
        let config = create_test_config(fetcher_config);
        let fetcher = Fetcher::new(&config, Arc::clone(&store)).expect("Failed to build fetcher");
        Self {
            store,
            fetcher,
            _dir: dir,
        }
    }

    fn new_batch(&self) -> i64 {
        self.store.lock().unwrap().create_batch("test-config").unwrap()
    }

    fn pending_count(&self) -> u64 {
        self.store.lock().unwrap().count_pending(Some(TASK)).unwrap()
    }
}

/// JSON page whose `links` point at `page` and `last`
fn paginated_body(base: &str, page: &str, last: &str) -> serde_json::Value {
    json!({
        "dados": [{"pagina": page}],
        "links": [
            {"rel": "self", "href": format!("{}/frentes?pagina={}", base, page)},
            {"rel": "first", "href": format!("{}/frentes?pagina=1", base)},
            {"rel": "last", "href": format!("{}/frentes?pagina={}", base, last)}
        ]
    })
}

async fn mount_page(server: &MockServer, page: &str, last: &str, expected: u64) {
    Mock::given(method("GET"))
        .and(path("/frentes"))
        .and(query_param("pagina", page))
        .respond_with(ResponseTemplate::new(200).set_body_json(paginated_body(
            &server.uri(),
            page,
            last,
        )))
        .expect(expected)
        .mount(server)
        .await;
}

fn payload_urls(results: &FetchResults) -> HashSet<String> {
    results
        .payloads()
        .expect("memory mode returns payloads")
        .iter()
        .map(|p| p.url.clone())
        .collect()
}

#[tokio::test]
async fn test_pagination_expands_from_first_page() {
    let server = MockServer::start().await;
    mount_page(&server, "1", "3", 1).await;
    mount_page(&server, "2", "3", 1).await;
    mount_page(&server, "3", "3", 1).await;

    let env = TestEnv::new(fast_fetcher_config(3));
    let batch_id = env.new_batch();

    let seed = format!("{}/frentes?pagina=1", server.uri());
    let report = env
        .fetcher
        .fetch(FetchJob::new(TASK, batch_id, vec![seed]))
        .await
        .expect("fetch should succeed");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
    assert_eq!(report.results.len(), 3);
    assert!(report.failures.is_empty());
    assert_eq!(env.pending_count(), 0);

    let expected: HashSet<String> = (1..=3)
        .map(|page| format!("{}/frentes?pagina={}", server.uri(), page))
        .collect();
    assert_eq!(payload_urls(&report.results), expected);
}

#[tokio::test]
async fn test_page_seeded_and_discovered_is_fetched_once() {
    let server = MockServer::start().await;
    mount_page(&server, "1", "3", 1).await;
    mount_page(&server, "2", "3", 1).await;
    mount_page(&server, "3", "3", 1).await;

    let env = TestEnv::new(fast_fetcher_config(3));
    let batch_id = env.new_batch();

    let seeds = vec![
        format!("{}/frentes?pagina=1", server.uri()),
        format!("{}/frentes?pagina=2", server.uri()),
        format!("{}/frentes?pagina=2", server.uri()),
    ];
    let report = env
        .fetcher
        .fetch(FetchJob::new(TASK, batch_id, seeds))
        .await
        .unwrap();

    assert_eq!(report.requested, 2);
    assert_eq!(report.results.len(), 3);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_always_failing_url_is_recorded_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let env = TestEnv::new(fast_fetcher_config(3));
    let batch_id = env.new_batch();

    let url = format!("{}/b", server.uri());
    let report = env
        .fetcher
        .fetch(FetchJob::new(TASK, batch_id, vec![url.clone()]))
        .await
        .unwrap();

    assert!(report.results.is_empty());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, FailureKind::HttpError(500));
    assert_eq!(report.failures[0].attempts, 3);

    let pending = env.store.lock().unwrap().load_pending(TASK).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].url, url);
    assert_eq!(pending[0].batch_id, batch_id);
    assert_eq!(pending[0].error_kind, FailureKind::HttpError(500));
}

#[tokio::test]
async fn test_decode_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/quebrado"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>manutencao</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let env = TestEnv::new(fast_fetcher_config(5));
    let batch_id = env.new_batch();

    let report = env
        .fetcher
        .fetch(FetchJob::new(
            TASK,
            batch_id,
            vec![format!("{}/quebrado", server.uri())],
        ))
        .await
        .unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, FailureKind::DecodeError);
    assert_eq!(report.failures[0].attempts, 1);
    assert_eq!(env.pending_count(), 1);
}

#[tokio::test]
async fn test_transient_failure_recovers_within_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/instavel"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/instavel"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"dados": []})))
        .expect(1)
        .mount(&server)
        .await;

    let env = TestEnv::new(fast_fetcher_config(3));
    let batch_id = env.new_batch();

    let report = env
        .fetcher
        .fetch(FetchJob::new(
            TASK,
            batch_id,
            vec![format!("{}/instavel", server.uri())],
        ))
        .await
        .unwrap();

    assert_eq!(report.results.len(), 1);
    assert!(report.failures.is_empty());
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    assert_eq!(env.pending_count(), 0);
}

#[tokio::test]
async fn test_pending_url_is_resumed_and_resolved() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/c"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/c"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"dados": [1]})))
        .mount(&server)
        .await;

    let env = TestEnv::new(fast_fetcher_config(1));
    let url = format!("{}/c", server.uri());

    let first_batch = env.new_batch();
    let first = env
        .fetcher
        .fetch(FetchJob::new(TASK, first_batch, vec![url.clone()]))
        .await
        .unwrap();
    assert_eq!(first.failures.len(), 1);
    assert_eq!(env.pending_count(), 1);

    // The next run has no fresh URLs: the pending one is still fetched
    let second_batch = env.new_batch();
    let second = env
        .fetcher
        .fetch(FetchJob::new(TASK, second_batch, vec![]))
        .await
        .unwrap();

    assert_eq!(second.pending_loaded, 1);
    assert_eq!(second.requested, 1);
    assert_eq!(second.resolved, 1);
    assert_eq!(payload_urls(&second.results), HashSet::from([url]));
    assert_eq!(env.pending_count(), 0);
}

#[tokio::test]
async fn test_pending_record_kept_when_resolution_disabled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/d"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/d"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let env = TestEnv::new(FetcherConfig {
        resolve_on_success: false,
        ..fast_fetcher_config(1)
    });
    let url = format!("{}/d", server.uri());

    let batch = env.new_batch();
    env.fetcher
        .fetch(FetchJob::new(TASK, batch, vec![url.clone()]))
        .await
        .unwrap();

    let batch = env.new_batch();
    let report = env
        .fetcher
        .fetch(FetchJob::new(TASK, batch, vec![]))
        .await
        .unwrap();

    assert_eq!(report.results.len(), 1);
    assert_eq!(report.resolved, 0);
    assert_eq!(env.pending_count(), 1);

    assert!(env.store.lock().unwrap().resolve_failure(TASK, &url).unwrap());
    assert_eq!(env.pending_count(), 0);
}

#[tokio::test]
async fn test_repeated_failure_keeps_first_batch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fora"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let env = TestEnv::new(fast_fetcher_config(1));
    let url = format!("{}/fora", server.uri());

    let first = env.new_batch();
    env.fetcher
        .fetch(FetchJob::new(TASK, first, vec![url.clone()]))
        .await
        .unwrap();

    let second = env.new_batch();
    let report = env
        .fetcher
        .fetch(FetchJob::new(TASK, second, vec![url.clone()]))
        .await
        .unwrap();
    assert_eq!(report.requested, 1);

    let pending = env.store.lock().unwrap().load_pending(TASK).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].batch_id, first);
    assert_eq!(pending[0].last_batch_id, second);
    assert_eq!(pending[0].failure_count, 2);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let server = MockServer::start().await;
    mount_page(&server, "1", "2", 2).await;
    mount_page(&server, "2", "2", 2).await;
    Mock::given(method("GET"))
        .and(path("/deputados"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"dados": []})))
        .mount(&server)
        .await;

    let env = TestEnv::new(fast_fetcher_config(2));
    let seeds = vec![
        format!("{}/frentes?pagina=1", server.uri()),
        format!("{}/deputados", server.uri()),
    ];

    let first = env
        .fetcher
        .fetch(FetchJob::new(TASK, env.new_batch(), seeds.clone()))
        .await
        .unwrap();
    let second = env
        .fetcher
        .fetch(FetchJob::new(TASK, env.new_batch(), seeds))
        .await
        .unwrap();

    assert_eq!(first.results.len(), 3);
    assert_eq!(payload_urls(&first.results), payload_urls(&second.results));
}

#[tokio::test]
async fn test_files_mode_writes_one_file_per_url() {
    let server = MockServer::start().await;
    mount_page(&server, "1", "2", 1).await;
    mount_page(&server, "2", "2", 1).await;

    let env = TestEnv::new(fast_fetcher_config(3));
    let out = TempDir::new().unwrap();
    let dir = out.path().join(TASK);

    let report = env
        .fetcher
        .fetch(
            FetchJob::new(
                TASK,
                env.new_batch(),
                vec![format!("{}/frentes?pagina=1", server.uri())],
            )
            .mode(SinkMode::Files { dir: dir.clone() }),
        )
        .await
        .unwrap();

    let files: HashSet<_> = report
        .results
        .files()
        .expect("files mode returns paths")
        .iter()
        .cloned()
        .collect();
    assert_eq!(files.len(), 2);

    for page in ["1", "2"] {
        let url = format!("{}/frentes?pagina={}", server.uri(), page);
        let file = dir.join(payload_file_name(&url, PayloadKind::Json));
        assert!(files.contains(&file));

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&file).unwrap()).unwrap();
        assert_eq!(written["dados"][0]["pagina"], page);
    }
}

#[tokio::test]
async fn test_html_pages_are_not_paginated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/discurso"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(
                    "<html><head><title>Discurso 1</title></head><body>texto</body></html>",
                )
                .insert_header("content-type", "text/html"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let env = TestEnv::new(fast_fetcher_config(3));
    let report = env
        .fetcher
        .fetch(
            FetchJob::new(
                TASK,
                env.new_batch(),
                vec![format!("{}/discurso", server.uri())],
            )
            .kind(PayloadKind::Html),
        )
        .await
        .unwrap();

    let payloads = report.results.payloads().unwrap();
    assert_eq!(payloads.len(), 1);
    match &payloads[0].payload {
        Payload::Html(page) => assert_eq!(page.title.as_deref(), Some("Discurso 1")),
        other => panic!("expected HTML payload, got {:?}", other),
    }
}

#[tokio::test]
async fn test_html_page_in_declared_charset_is_decoded() {
    let server = MockServer::start().await;
    // "Sessão" in ISO-8859-1
    let mut body = b"<html><head><title>Sess".to_vec();
    body.push(0xe3);
    body.extend_from_slice(b"o</title></head><body>pauta</body></html>");
    Mock::given(method("GET"))
        .and(path("/sessao"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=ISO-8859-1"))
        .expect(1)
        .mount(&server)
        .await;

    let env = TestEnv::new(fast_fetcher_config(3));
    let report = env
        .fetcher
        .fetch(
            FetchJob::new(
                TASK,
                env.new_batch(),
                vec![format!("{}/sessao", server.uri())],
            )
            .kind(PayloadKind::Html),
        )
        .await
        .unwrap();

    assert!(report.failures.is_empty());
    let payloads = report.results.payloads().unwrap();
    match &payloads[0].payload {
        Payload::Html(page) => assert_eq!(page.title.as_deref(), Some("Sessão")),
        other => panic!("expected HTML payload, got {:?}", other),
    }
}

#[tokio::test]
async fn test_requests_never_exceed_concurrency() {
    let delay = Duration::from_millis(300);
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"dados": []}))
                .set_delay(delay),
        )
        .expect(9)
        .mount(&server)
        .await;

    let env = TestEnv::new(FetcherConfig {
        concurrency: 3,
        ..fast_fetcher_config(1)
    });
    let seeds: Vec<String> = (0..9)
        .map(|i| format!("{}/votacoes/{}", server.uri(), i))
        .collect();

    let started = std::time::Instant::now();
    let report = env
        .fetcher
        .fetch(FetchJob::new(TASK, env.new_batch(), seeds))
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(report.results.len(), 9);
    // Three waves of three requests each
    assert!(elapsed >= delay * 3, "finished too fast: {:?}", elapsed);
    assert!(elapsed < delay * 9, "requests ran sequentially: {:?}", elapsed);
}

#[tokio::test]
async fn test_every_distinct_url_ends_in_results_or_failures() {
    let server = MockServer::start().await;
    mount_page(&server, "1", "3", 1).await;
    mount_page(&server, "2", "3", 1).await;
    mount_page(&server, "3", "3", 1).await;
    Mock::given(method("GET"))
        .and(path("/orgaos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"dados": []})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/eventos"))
        .respond_with(ResponseTemplate::new(502))
        .expect(2)
        .mount(&server)
        .await;

    let env = TestEnv::new(fast_fetcher_config(2));
    let seeds = vec![
        format!("{}/frentes?pagina=1", server.uri()),
        format!("{}/frentes?pagina=3", server.uri()),
        format!("{}/orgaos", server.uri()),
        format!("{}/eventos", server.uri()),
        format!("{}/orgaos", server.uri()),
    ];
    let report = env
        .fetcher
        .fetch(FetchJob::new(TASK, env.new_batch(), seeds))
        .await
        .unwrap();

    let mut seen = payload_urls(&report.results);
    for failure in &report.failures {
        assert!(seen.insert(failure.request.url.clone()));
    }

    let mut expected: HashSet<String> = (1..=3)
        .map(|page| format!("{}/frentes?pagina={}", server.uri(), page))
        .collect();
    expected.insert(format!("{}/orgaos", server.uri()));
    expected.insert(format!("{}/eventos", server.uri()));

    assert_eq!(report.results.len() + report.failures.len(), expected.len());
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn test_pagination_can_be_disabled() {
    let server = MockServer::start().await;
    mount_page(&server, "1", "5", 1).await;

    let env = TestEnv::new(fast_fetcher_config(3));
    let report = env
        .fetcher
        .fetch(
            FetchJob::new(
                TASK,
                env.new_batch(),
                vec![format!("{}/frentes?pagina=1", server.uri())],
            )
            .follow_pagination(false),
        )
        .await
        .unwrap();

    assert_eq!(report.results.len(), 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_non_numeric_page_aborts_and_keeps_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fora"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_page(&server, "1", "ultima", 1).await;

    // One worker keeps the order deterministic: the failing URL goes first
    let env = TestEnv::new(FetcherConfig {
        concurrency: 1,
        ..fast_fetcher_config(1)
    });
    let seeds = vec![
        format!("{}/fora", server.uri()),
        format!("{}/frentes?pagina=1", server.uri()),
    ];

    let result = env
        .fetcher
        .fetch(FetchJob::new(TASK, env.new_batch(), seeds))
        .await;

    assert!(matches!(result, Err(ColetaError::Pagination(_))));
    assert_eq!(env.pending_count(), 1);
}

#[tokio::test]
async fn test_slow_response_is_a_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lento"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"dados": []}))
                .set_delay(Duration::from_secs(3)),
        )
        .expect(2)
        .mount(&server)
        .await;

    let env = TestEnv::new(FetcherConfig {
        timeout_secs: 1,
        ..fast_fetcher_config(2)
    });

    let report = env
        .fetcher
        .fetch(FetchJob::new(
            TASK,
            env.new_batch(),
            vec![format!("{}/lento", server.uri())],
        ))
        .await
        .unwrap();

    assert!(report.results.is_empty());
    assert_eq!(report.failures[0].kind, FailureKind::Timeout);
    assert_eq!(report.failures[0].attempts, 2);
}

#[tokio::test]
async fn test_unreachable_host_is_a_transport_error() {
    // Bind then release a port so connections to it are refused
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/sumiu", listener.local_addr().unwrap());
    drop(listener);

    let env = TestEnv::new(fast_fetcher_config(2));
    let report = env
        .fetcher
        .fetch(FetchJob::new(TASK, env.new_batch(), vec![url]))
        .await
        .unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, FailureKind::TransportError);
    assert_eq!(report.failures[0].attempts, 2);
    assert_eq!(env.pending_count(), 1);
}
