use crossfarm::application::system::Application;
use crossfarm::config::Config;
use crossfarm::domain::errors::StrategyError;
use crossfarm::domain::messaging::{Envelope, Ontology, Performative, Route};
use crossfarm::domain::optimization::{Decision, Genotype, StrategyModel, TrainingState};
use crossfarm::domain::ports::MessageTransport;
use crossfarm::domain::repositories::ModelRepository;
use crossfarm::infrastructure::mock::MockPriceDataService;
use crossfarm::infrastructure::observability::Metrics;
use crossfarm::infrastructure::{InMemoryModelRepository, MessageBus};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use uuid::Uuid;

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_config() -> Config {
    let mut config = Config::default();
    config.optimizer.generations = 4;
    config.optimizer.seed = Some(21);
    config.dispatch.worker_count = 3;
    config.dispatch.reply_timeout_ms = 2_000;
    config
}

fn temp_dir(label: &str) -> PathBuf {
    let unique_id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!(
        "crossfarm_flow_{}_{}_{}",
        std::process::id(),
        unique_id,
        label
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

async fn in_memory_app(config: Config) -> (Application, Arc<InMemoryModelRepository>, MessageBus) {
    let prices = MockPriceDataService::new();
    prices
        .set_closes("BTC", MockPriceDataService::synthetic_closes(400, 8))
        .await;
    let repository = Arc::new(InMemoryModelRepository::new());
    let bus = MessageBus::new();

    let app = Application::with_services(
        config,
        Arc::new(prices),
        repository.clone(),
        Arc::new(bus.clone()),
        Metrics::new().unwrap(),
    );
    (app, repository, bus)
}

#[tokio::test]
async fn test_train_persists_best_model_and_serves_decisions() {
    let (app, repository, bus) = in_memory_app(test_config()).await;
    let system = app.start("BTC").await.unwrap();
    assert_eq!(system.workers.len(), 3);

    let report = system.agent.train().await.unwrap();

    assert_eq!(report.outcome.history.len(), 4);
    let best_per_generation: Vec<f64> = report
        .outcome
        .history
        .iter()
        .map(|g| g.best_fitness)
        .collect();
    // parents always survive, so the best never gets worse
    assert!(best_per_generation.windows(2).all(|w| w[1] >= w[0]));

    let stored = repository.load("BTC").await.unwrap().unwrap();
    assert_eq!(stored.genotype(), report.outcome.best);
    assert_eq!(stored.fitness, report.outcome.fitness);
    assert!(matches!(system.agent.status().await, TrainingState::Trained(_)));
    assert!(app.metrics.jobs_completed_total.get() >= 12.0);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = Arc::clone(&system.agent)
        .serve_decisions(shutdown_rx)
        .await
        .unwrap();

    let id = Uuid::new_v4();
    let mut replies = bus
        .subscribe(Route::correlated(
            "client",
            Performative::Reply,
            Ontology::Decision,
            id,
        ))
        .await
        .unwrap();
    bus.send(Envelope::request(
        "client",
        system.agent.address(),
        Ontology::Decision,
        id,
        String::new(),
    ))
    .await
    .unwrap();

    let reply = replies.recv().await.unwrap();
    let answered = reply.answer.as_deref().and_then(Decision::from_answer);
    assert_eq!(answered, Some(system.agent.decide().await.unwrap()));

    shutdown_tx.send(true).unwrap();
    server.await.unwrap();
    system.shutdown().await;
}

#[tokio::test]
async fn test_decision_agent_uses_model_trained_elsewhere() {
    let (app, _repository, _bus) = in_memory_app(test_config()).await;

    let err = app.decision_agent("BTC").decide().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<StrategyError>(),
        Some(StrategyError::NotTrained { .. })
    ));

    let system = app.start("BTC").await.unwrap();
    system.agent.train().await.unwrap();
    system.shutdown().await;

    assert!(app.decision_agent("BTC").decide().await.is_ok());
}

#[tokio::test]
async fn test_symbol_case_does_not_split_models() {
    let (app, repository, _bus) = in_memory_app(test_config()).await;

    let system = app.start("btc").await.unwrap();
    assert_eq!(system.agent.symbol(), "BTC");
    let report = system.agent.train().await.unwrap();
    system.shutdown().await;

    assert_eq!(report.model.symbol, "BTC");
    assert_eq!(repository.symbols().await.unwrap(), vec!["BTC".to_string()]);
    assert!(app.decision_agent("BTC").decide().await.is_ok());
    assert!(app.decision_agent(" Btc ").decide().await.is_ok());
}

#[tokio::test]
async fn test_model_saved_under_lowercase_symbol_serves_uppercase_requests() {
    let (app, repository, _bus) = in_memory_app(test_config()).await;
    repository
        .save(&StrategyModel::new("btc", Genotype::new(5, 20), 3.0))
        .await
        .unwrap();

    assert!(app.decision_agent("BTC").decide().await.is_ok());
}

#[tokio::test]
async fn test_start_fails_without_price_history() {
    let (app, _repository, bus) = in_memory_app(test_config()).await;

    assert!(app.start("DOGE").await.is_err());
    // workers started before the failure are torn down
    assert_eq!(bus.route_count().await, 0);
}

#[tokio::test]
async fn test_build_from_csv_and_json_store() {
    let price_dir = temp_dir("prices");
    let model_dir = temp_dir("models");

    let mut csv = String::from("time,high,low,open,close\n");
    for (i, close) in MockPriceDataService::synthetic_closes(300, 9).iter().enumerate() {
        let time = 1_420_070_400 + i as i64 * 86_400;
        csv.push_str(&format!("{},{},{},{},{}\n", time, close + 1.0, close - 1.0, close, close));
    }
    std::fs::write(price_dir.join("ETH.csv"), csv).unwrap();

    let mut config = test_config();
    config.dispatch.worker_count = 2;
    config.storage.price_data_dir = price_dir.clone();
    config.storage.model_dir = model_dir.clone();

    let app = Application::build(config.clone()).await.unwrap();
    let system = app.start("ETH").await.unwrap();
    let report = system.agent.train().await.unwrap();
    system.shutdown().await;

    // a fresh application reads the model back from disk
    let reopened = Application::build(config).await.unwrap();
    assert_eq!(reopened.repository.symbols().await.unwrap(), vec!["ETH".to_string()]);
    let stored = reopened.repository.load("ETH").await.unwrap().unwrap();
    assert_eq!(stored.genotype(), report.model.genotype());
    assert!(reopened.decision_agent("ETH").decide().await.is_ok());

    std::fs::remove_dir_all(price_dir).ok();
    std::fs::remove_dir_all(model_dir).ok();
}
