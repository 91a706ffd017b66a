use crate::application::optimization::conversation::{Conversation, ConversationConfig};
use crate::application::optimization::job_manager::SharedJobManager;
use crate::domain::errors::{ConversationError, OptimizerError};
use crate::domain::optimization::{GeneBounds, Genotype, Population};
use crate::domain::ports::MessageTransport;
use crate::infrastructure::observability::Metrics;
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Genetic search settings, loadable from an optimizer TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub population_size: usize,
    pub generations: usize,
    /// Probability that an offspring is a plain clone of its parent
    pub mutation_chance: f64,
    /// Upper bound on jobs per generation; defaults to one per available worker
    pub max_jobs: Option<usize>,
    pub gene_bounds: GeneBounds,
    /// Fixed seed for reproducible runs
    pub seed: Option<u64>,
    /// Abort a generation that has not completed in time
    pub generation_deadline_ms: Option<u64>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            population_size: 6,
            generations: 20,
            mutation_chance: 0.05,
            max_jobs: None,
            gene_bounds: GeneBounds::default(),
            seed: None,
            generation_deadline_ms: None,
        }
    }
}

/// Best candidate after one generation's selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub generation: usize,
    pub best: Genotype,
    pub best_fitness: f64,
    pub mean_fitness: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationOutcome {
    pub best: Genotype,
    pub fitness: f64,
    pub history: Vec<GenerationReport>,
}

/// Population search whose fitness evaluations run on remote workers.
///
/// Each generation is one batch on the job manager: parents plus offspring are
/// dispatched, evaluated, and the fittest `population_size` survive.
pub struct GeneticOptimizer {
    manager: SharedJobManager,
    transport: Arc<dyn MessageTransport>,
    address: String,
    config: OptimizerConfig,
    conversation: ConversationConfig,
    metrics: Option<Metrics>,
    rng: StdRng,
}

impl GeneticOptimizer {
    pub fn new(
        manager: SharedJobManager,
        transport: Arc<dyn MessageTransport>,
        config: OptimizerConfig,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self {
            manager,
            transport,
            address: "optimizer".to_string(),
            config,
            conversation: ConversationConfig::default(),
            metrics: None,
            rng,
        }
    }

    /// Bus address replies are routed back to
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_conversation_config(mut self, conversation: ConversationConfig) -> Self {
        self.conversation = conversation;
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub async fn run(&mut self) -> Result<OptimizationOutcome, OptimizerError> {
        if self.config.population_size == 0 {
            return Err(OptimizerError::EmptyPopulation);
        }

        let bounds = self.config.gene_bounds.normalized();
        let mut population: Population = (0..self.config.population_size)
            .map(|_| Genotype::random(&mut self.rng, &bounds))
            .collect();
        let generations = self.config.generations.max(1);

        info!(
            "GeneticOptimizer: Starting {} generations (population {}, mutation chance {})",
            generations, self.config.population_size, self.config.mutation_chance
        );

        let mut history = Vec::with_capacity(generations);
        let mut best = (population[0], f64::NEG_INFINITY);

        for generation in 0..generations {
            let expanded = self.expand(&population);
            let fitness = self.evaluate(generation, &expanded).await?;
            if fitness.len() != expanded.len() {
                return Err(OptimizerError::FitnessCountMismatch {
                    expected: expanded.len(),
                    actual: fitness.len(),
                });
            }

            let mut scored: Vec<(Genotype, f64)> = expanded.into_iter().zip(fitness).collect();
            // stable: equal fitness keeps dispatch order
            scored.sort_by(|a, b| b.1.total_cmp(&a.1));
            scored.truncate(self.config.population_size);

            let mean = scored.iter().map(|(_, f)| f).sum::<f64>() / scored.len() as f64;
            best = scored[0];
            population = scored.into_iter().map(|(g, _)| g).collect();

            info!(
                "GeneticOptimizer: Generation {}/{} best {} fitness {:.4} (mean {:.4})",
                generation + 1,
                generations,
                best.0,
                best.1,
                mean
            );
            if let Some(metrics) = &self.metrics {
                metrics.generations_total.inc();
                metrics.best_fitness.set(best.1);
            }

            history.push(GenerationReport {
                generation,
                best: best.0,
                best_fitness: best.1,
                mean_fitness: mean,
            });
        }

        Ok(OptimizationOutcome {
            best: best.0,
            fitness: best.1,
            history,
        })
    }

    /// Parents followed by one offspring each.
    fn expand(&mut self, population: &[Genotype]) -> Population {
        let perturb = (1.0 - self.config.mutation_chance).clamp(0.0, 1.0);
        let offspring: Vec<Genotype> = population
            .iter()
            .map(|g| {
                if self.rng.random_bool(perturb) {
                    g.perturbed(&mut self.rng)
                } else {
                    *g
                }
            })
            .collect();

        population.iter().copied().chain(offspring).collect()
    }

    async fn evaluate(
        &self,
        generation: usize,
        genotypes: &[Genotype],
    ) -> Result<Vec<f64>, OptimizerError> {
        let jobs = self
            .manager
            .create_jobs(genotypes, self.config.max_jobs)
            .await
            .map_err(|source| OptimizerError::Dispatch { generation, source })?;
        let batch_id = jobs.first().map(|job| job.batch_id);

        let handles: Vec<JoinHandle<Result<(), ConversationError>>> = jobs
            .into_iter()
            .map(|job| {
                let conversation = Conversation::new(
                    self.address.clone(),
                    job,
                    self.manager.clone(),
                    Arc::clone(&self.transport),
                    self.conversation.clone(),
                );
                match &self.metrics {
                    Some(metrics) => conversation.with_metrics(metrics.clone()).spawn(),
                    None => conversation.spawn(),
                }
            })
            .collect();

        let finished = match self.config.generation_deadline_ms {
            Some(deadline_ms) => {
                match tokio::time::timeout(
                    Duration::from_millis(deadline_ms),
                    self.manager.jobs_finished(),
                )
                .await
                {
                    Ok(finished) => finished,
                    Err(_) => {
                        self.cancel(batch_id, &handles, "generation deadline exceeded")
                            .await;
                        return Err(OptimizerError::DeadlineExceeded {
                            generation,
                            deadline_ms,
                        });
                    }
                }
            }
            None => self.manager.jobs_finished().await,
        };

        match finished {
            Ok(values) => {
                for outcome in join_all(handles).await {
                    if let Ok(Err(e)) = outcome {
                        warn!("GeneticOptimizer: Conversation ended with error: {}", e);
                    }
                }
                Ok(values)
            }
            Err(source) => {
                self.cancel(batch_id, &handles, &source.to_string()).await;
                Err(OptimizerError::Dispatch { generation, source })
            }
        }
    }

    async fn cancel(
        &self,
        batch_id: Option<u64>,
        handles: &[JoinHandle<Result<(), ConversationError>>],
        reason: &str,
    ) {
        warn!("GeneticOptimizer: Cancelling generation: {}", reason);
        for handle in handles {
            handle.abort();
        }
        if let Some(batch_id) = batch_id {
            self.manager.abort_batch(batch_id, reason).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::optimization::job_manager::JobManager;
    use crate::domain::errors::JobManagerError;
    use crate::domain::messaging::{Ontology, Performative, Route};
    use crate::domain::optimization::WorkerId;
    use crate::infrastructure::message_bus::MessageBus;

    /// Fitness favours short windows close to 10.
    async fn spawn_peak_worker(bus: &MessageBus, address: &str) {
        let mut requests = bus
            .subscribe(Route::any(
                address,
                Performative::Request,
                Ontology::CostComputation,
            ))
            .await
            .unwrap();
        let bus = bus.clone();
        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                let genotypes: Vec<Genotype> = serde_json::from_str(&request.body).unwrap();
                let values: Vec<f64> = genotypes
                    .iter()
                    .map(|g| -((g.short_window as f64) - 10.0).abs())
                    .collect();
                bus.send(request.reply(serde_json::to_string(&values).unwrap()))
                    .await
                    .unwrap();
            }
        });
    }

    fn optimizer(bus: &MessageBus, workers: &[&str], config: OptimizerConfig) -> GeneticOptimizer {
        let manager = SharedJobManager::new(JobManager::new(
            workers.iter().map(|w| WorkerId::from(*w)),
        ));
        GeneticOptimizer::new(manager, Arc::new(bus.clone()), config).with_conversation_config(
            ConversationConfig {
                reply_timeout: Duration::from_millis(200),
                attempts: 2,
                max_reassignments: Some(4),
            },
        )
    }

    fn seeded(seed: u64) -> OptimizerConfig {
        OptimizerConfig {
            generations: 8,
            seed: Some(seed),
            ..OptimizerConfig::default()
        }
    }

    #[test]
    fn test_expand_appends_one_offspring_per_parent() {
        let bus = MessageBus::new();
        let mut optimizer = optimizer(&bus, &["w0"], seeded(3));
        let parents = vec![Genotype::new(5, 20), Genotype::new(1, 1), Genotype::new(30, 90)];

        let expanded = optimizer.expand(&parents);

        assert_eq!(expanded.len(), 6);
        assert_eq!(&expanded[..3], &parents[..]);
        for (parent, child) in parents.iter().zip(&expanded[3..]) {
            assert!(child.short_window.abs_diff(parent.short_window) <= 1);
            assert!(child.long_window.abs_diff(parent.long_window) <= 1);
            assert!(child.short_window >= 1 && child.long_window >= 1);
        }
    }

    #[test]
    fn test_full_mutation_chance_clones_parents() {
        let bus = MessageBus::new();
        let mut optimizer = optimizer(
            &bus,
            &["w0"],
            OptimizerConfig {
                mutation_chance: 1.0,
                ..seeded(1)
            },
        );
        let parents = vec![Genotype::new(4, 8), Genotype::new(6, 12)];

        let expanded = optimizer.expand(&parents);
        assert_eq!(&expanded[2..], &parents[..]);
    }

    #[tokio::test]
    async fn test_run_improves_and_keeps_best() {
        let bus = MessageBus::new();
        spawn_peak_worker(&bus, "w0").await;
        spawn_peak_worker(&bus, "w1").await;
        let mut optimizer = optimizer(&bus, &["w0", "w1"], seeded(42));

        let outcome = optimizer.run().await.unwrap();

        assert_eq!(outcome.history.len(), 8);
        for pair in outcome.history.windows(2) {
            assert!(pair[1].best_fitness >= pair[0].best_fitness);
        }
        assert_eq!(outcome.fitness, outcome.history[7].best_fitness);
        assert_eq!(outcome.fitness, -((outcome.best.short_window as f64) - 10.0).abs());
    }

    #[tokio::test]
    async fn test_same_seed_same_outcome() {
        let bus = MessageBus::new();
        spawn_peak_worker(&bus, "w0").await;

        let first = optimizer(&bus, &["w0"], seeded(7)).run().await.unwrap();
        let second = optimizer(&bus, &["w0"], seeded(7)).run().await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_empty_population_rejected() {
        let bus = MessageBus::new();
        let mut optimizer = optimizer(
            &bus,
            &["w0"],
            OptimizerConfig {
                population_size: 0,
                ..seeded(1)
            },
        );
        assert!(matches!(
            optimizer.run().await,
            Err(OptimizerError::EmptyPopulation)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_workers_fail_the_run() {
        let bus = MessageBus::new();
        let manager = SharedJobManager::new(JobManager::new(vec![WorkerId::from("ghost")]));
        let mut optimizer = GeneticOptimizer::new(manager.clone(), Arc::new(bus), seeded(9))
            .with_conversation_config(ConversationConfig {
                reply_timeout: Duration::from_millis(5),
                attempts: 1,
                max_reassignments: Some(2),
            });

        let err = optimizer.run().await.unwrap_err();

        assert!(matches!(
            err,
            OptimizerError::Dispatch {
                generation: 0,
                source: JobManagerError::BatchAborted { .. }
            }
        ));
        assert!(!manager.is_batch_open().await);
    }

    #[tokio::test]
    async fn test_generation_deadline() {
        let bus = MessageBus::new();
        let manager = SharedJobManager::new(JobManager::new(vec![WorkerId::from("ghost")]));
        let mut optimizer = GeneticOptimizer::new(
            manager.clone(),
            Arc::new(bus),
            OptimizerConfig {
                generation_deadline_ms: Some(50),
                ..seeded(9)
            },
        )
        .with_conversation_config(ConversationConfig {
            reply_timeout: Duration::from_millis(20),
            attempts: 1,
            max_reassignments: None,
        });

        let err = optimizer.run().await.unwrap_err();

        assert!(matches!(
            err,
            OptimizerError::DeadlineExceeded {
                generation: 0,
                deadline_ms: 50
            }
        ));
        assert!(!manager.is_batch_open().await);
    }

    #[test]
    fn test_config_from_toml() {
        let config: OptimizerConfig = toml::from_str(
            r#"
            population_size = 10
            generations = 5
            seed = 99

            [gene_bounds]
            short_min = 2
            short_max = 20
            long_min = 10
            long_max = 100
            "#,
        )
        .unwrap();

        assert_eq!(config.population_size, 10);
        assert_eq!(config.mutation_chance, 0.05);
        assert_eq!(config.seed, Some(99));
        assert_eq!(config.gene_bounds.long_max, 100);
        assert_eq!(config.max_jobs, None);
    }
}
