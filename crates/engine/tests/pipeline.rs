use engine::{AnalysisEngine, AnalysisRequest, EngineConfig, Fingerprint, Provenance};
use std::sync::Arc;
use std::time::Duration;
use storage::{KeyValueStore, StorageConfig};
use tempfile::TempDir;
use testing::fixtures::{CART, CART_REPLY, COST_AMOUNT, FREE_VARIABLE, MALFORMED, PRICE_TOTAL};
use testing::{FailingInference, ScriptedInference};

fn engine_with(client: Arc<ScriptedInference>) -> AnalysisEngine {
    let store = StorageConfig::memory().open().unwrap();
    AnalysisEngine::new(EngineConfig::default(), store, Some(client)).unwrap()
}

#[tokio::test]
async fn test_free_variable_is_the_only_unresolved_name() {
    let client = Arc::new(ScriptedInference::new([r#"{"inferences": {"b": "int"}}"#]));
    let engine = engine_with(client.clone());

    let result = engine.analyze(&AnalysisRequest::new(FREE_VARIABLE)).await;
    assert!(result.success);
    let names: Vec<_> = result.unresolved.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["b"]);
    assert_eq!(result.unresolved[0].use_line, 2);
    assert_eq!(result.assertion("b").unwrap().inferred_type, "int");

    let prompt = &client.prompts()[0];
    assert!(prompt.user.contains("return a + b"));
}

#[tokio::test]
async fn test_analysis_is_deterministic() {
    let offline = |code: &str| AnalysisRequest::new(code).offline().without_cache();
    let first_engine = engine_with(Arc::new(ScriptedInference::new(["{}"])));
    let second_engine = engine_with(Arc::new(ScriptedInference::new(["{}"])));

    let first = first_engine.analyze(&offline(CART)).await;
    let second = second_engine.analyze(&offline(CART)).await;
    assert_eq!(first, second);
    assert_eq!(
        first.fingerprint,
        Fingerprint::of(&offline(CART).source_unit())
    );

    let names: Vec<_> = first.unresolved.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["quantity", "source", "discount"]);
}

#[tokio::test]
async fn test_second_call_is_served_from_cache() {
    let client = Arc::new(ScriptedInference::new([CART_REPLY]));
    let engine = engine_with(client.clone());
    let request = AnalysisRequest::new(CART);

    let first = engine.analyze(&request).await;
    let second = engine.analyze(&request).await;
    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.as_cached(), second);
    assert_eq!(client.calls(), 1);

    let quantity = second.assertion("quantity").unwrap();
    assert_eq!(quantity.confidence, 0.9);
    assert_eq!(quantity.explanation.as_deref(), Some("multiplies a price"));
    assert!(
        second
            .assertions
            .iter()
            .all(|a| (0.0..=1.0).contains(&a.confidence))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cold_requests_share_one_external_call() {
    let client = Arc::new(
        ScriptedInference::new([CART_REPLY]).with_delay(Duration::from_millis(100)),
    );
    let engine = Arc::new(engine_with(client.clone()));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.analyze(&AnalysisRequest::new(CART)).await })
        })
        .collect();

    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.unwrap());
    }

    assert_eq!(client.calls(), 1);
    assert_eq!(results.iter().filter(|r| !r.cached).count(), 1);
    let computed = results.iter().find(|r| !r.cached).unwrap();
    for result in &results {
        assert_eq!(result.as_cached(), computed.as_cached());
    }
    assert_eq!(engine.cache_stats().in_flight, 0);
}

#[tokio::test]
async fn test_similar_code_reuses_memory_without_external_call() {
    let client = Arc::new(ScriptedInference::new([
        r#"{"inferences": {"price": "float"}, "confidence": {"price": 0.92}}"#,
    ]));
    let engine = engine_with(client.clone());

    engine.analyze(&AnalysisRequest::new(PRICE_TOTAL)).await;
    assert_eq!(client.calls(), 1);

    let result = engine.analyze(&AnalysisRequest::new(COST_AMOUNT)).await;
    assert_eq!(client.calls(), 1);
    let cost = result.assertion("cost").unwrap();
    assert_eq!(cost.inferred_type, "float");
    assert_eq!(cost.provenance, Provenance::Memory);
    assert_eq!(cost.confidence, 0.92);

    let pattern = &engine.memory_search("$T", 0.0)[0];
    assert_eq!(pattern.hit_count, 2);
}

#[tokio::test]
async fn test_memory_can_be_disabled_per_request() {
    let client = Arc::new(ScriptedInference::new([
        r#"{"inferences": {"price": "float", "cost": "int"}, "confidence": 0.9}"#,
    ]));
    let engine = engine_with(client.clone());

    engine.analyze(&AnalysisRequest::new(PRICE_TOTAL)).await;
    let result = engine
        .analyze(&AnalysisRequest::new(COST_AMOUNT).without_memory())
        .await;
    assert_eq!(client.calls(), 2);
    assert_eq!(
        result.assertion("cost").unwrap().provenance,
        Provenance::ExternalInference
    );
}

#[tokio::test]
async fn test_external_failures_still_produce_results() {
    let store = StorageConfig::memory().open().unwrap();
    let failing = Arc::new(FailingInference::timeout());
    let engine =
        AnalysisEngine::new(EngineConfig::default(), store, Some(failing.clone())).unwrap();

    let result = engine.analyze(&AnalysisRequest::new(CART)).await;
    assert!(result.success);
    assert!(result.assertions.is_empty());
    assert_eq!(result.unresolved.len(), 3);
    assert!(result.error.unwrap().contains("timed out"));
    assert_eq!(failing.calls(), 1);

    // Degraded results are cached like any other.
    let again = engine.analyze(&AnalysisRequest::new(CART)).await;
    assert!(again.cached);
    assert_eq!(failing.calls(), 1);
}

#[tokio::test]
async fn test_slow_external_service_is_bounded_by_timeout() {
    let client = Arc::new(ScriptedInference::new([CART_REPLY]).with_delay(Duration::from_secs(10)));
    let store = StorageConfig::memory().open().unwrap();
    let config = EngineConfig::default().with_inference_timeout(Duration::from_millis(100));
    let engine = AnalysisEngine::new(config, store, Some(client)).unwrap();

    let started = std::time::Instant::now();
    let result = engine.analyze(&AnalysisRequest::new(CART)).await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(result.success);
    assert!(result.error.is_some());
}

#[tokio::test]
async fn test_malformed_source() {
    let client = Arc::new(ScriptedInference::new(["{}"]));
    let engine = engine_with(client.clone());

    let result = engine.analyze(&AnalysisRequest::new(MALFORMED)).await;
    assert!(!result.success);
    assert!(result.error.is_some());
    assert!(result.scopes.is_empty());
    assert_eq!(client.calls(), 0);

    let annotation = engine.annotate(&AnalysisRequest::new(MALFORMED)).await;
    assert!(!annotation.success);
    assert!(annotation.cached);
    assert_eq!(annotation.annotated_code, MALFORMED);
}

#[tokio::test]
async fn test_annotate() {
    let client = Arc::new(ScriptedInference::new([CART_REPLY]));
    let engine = engine_with(client);

    let annotation = engine.annotate(&AnalysisRequest::new(CART)).await;
    assert!(annotation.success);
    assert_eq!(annotation.original_code, CART);
    assert_eq!(annotation.assertions.len(), 3);

    let code = &annotation.annotated_code;
    assert!(code.starts_with("# Inferred types for unresolved names:\n"));
    assert!(code.contains("#   quantity: int (external-inference, confidence 0.90)"));
    assert!(code.contains("TAX: float = 0.2"));
    assert!(code.contains("def load(path: str) -> Any:"));
    assert!(code.contains("def describe(name: str, count: int = 1) -> str:"));
    assert!(code.contains("def add(self, item: Any) -> int:"));
    assert!(code.contains("    label: str = \"cart\""));
    assert!(annotation.annotation_count >= 6);
}

#[tokio::test]
async fn test_annotate_applies_function_suggestions() {
    let code = "def scale(value, factor):\n    return value * factor\n";
    let client = Arc::new(ScriptedInference::new([
        r#"{"function_suggestions": {"scale": {"params": {"value": "float", "factor": "float"}, "return": "float"}}, "confidence": 0.9}"#,
    ]));
    let engine = engine_with(client.clone());

    let first = engine.annotate(&AnalysisRequest::new(code)).await;
    assert!(first.success);
    assert_eq!(first.error, None);
    assert_eq!(
        first.annotated_code,
        "def scale(value: float, factor: float) -> float:\n    return value * factor\n"
    );
    assert_eq!(first.function_suggestions.len(), 1);
    assert_eq!(client.calls(), 1);

    // The analysis comes from the cache and the suggestions from memory.
    let second = engine.annotate(&AnalysisRequest::new(code)).await;
    assert!(second.cached);
    assert_eq!(second.annotated_code, first.annotated_code);
    let value = second.function_suggestions[0].param("value").unwrap();
    assert_eq!(value.provenance, Provenance::Memory);
    assert_eq!(client.calls(), 1);

    let offline = engine
        .annotate(&AnalysisRequest::new(code).offline().without_memory())
        .await;
    assert_eq!(
        offline.annotated_code,
        "def scale(value: int | float, factor: Any) -> Any:\n    return value * factor\n"
    );
    assert!(offline.function_suggestions.is_empty());
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn test_results_and_memory_survive_restart() {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig::sqlite(dir.path().join("typesage.db"));

    let fingerprint = {
        let client = Arc::new(ScriptedInference::new([
            r#"{"inferences": {"price": "float"}, "confidence": 0.9}"#,
        ]));
        let store: Arc<dyn KeyValueStore> = config.open().unwrap();
        let engine = AnalysisEngine::new(EngineConfig::default(), store, Some(client)).unwrap();
        engine.analyze(&AnalysisRequest::new(PRICE_TOTAL)).await.fingerprint
    };

    let client = Arc::new(ScriptedInference::new(["{}"]));
    let store = config.open().unwrap();
    let engine = AnalysisEngine::new(EngineConfig::default(), store, Some(client.clone())).unwrap();

    let cached = engine.analyze(&AnalysisRequest::new(PRICE_TOTAL)).await;
    assert!(cached.cached);
    assert_eq!(cached.fingerprint, fingerprint);

    let similar = engine.analyze(&AnalysisRequest::new(COST_AMOUNT)).await;
    assert_eq!(similar.assertion("cost").unwrap().provenance, Provenance::Memory);
    assert_eq!(client.calls(), 0);

    let stats = engine.cache_stats();
    assert_eq!(stats.analysis_results, 2);
    assert_eq!(stats.history_records, 2);
    assert_eq!(engine.status().await.storage_backend, "sqlite");

    let report = engine.cache_clear(None).unwrap();
    assert_eq!(report.total(), 5);
    tokio_test::assert_ok!(engine.memory_export());
    assert!(engine.memory_export().unwrap().patterns.is_empty());
}
