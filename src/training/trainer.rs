//! Episode orchestration: beam search, evaluation, selection, persistence
//! and periodic behavior updates.
//!
//! ```text
//! per episode
//! ─────────────────────────────────────
//! INIT         beam = { empty trajectory }
//! BEAM_SEARCH  for turn in 0..max_turns, until every member is finished:
//!                sample k replies per live member (concurrently, cached)
//!                branch one child per usable reply, freeze finished ones
//!                keep finished members, prune live children to the rest of W
//! EVALUATION   value estimator on every trajectory in the final beam
//! SELECTION    group-relative advantages, argmax or soft-max exploration
//! PERSIST      winner + reward + metadata to the run store
//! every F episodes: mine top winners, update agent prompts
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result as AnyResult;
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use super::advantage::{compute_advantages, select_index};
use super::metrics::{MetricsSnapshot, RunMetrics};
use super::summary::TrainingSummary;
use super::value::{credit_assignment, ValueEstimator};
use crate::agent::{profiles_from_config, Agent, AgentProfile};
use crate::behavior::{apply_snippets, BehaviorExtractor, BehaviorLibrary, BehaviorSnippet};
use crate::config::{ColloquyConfig, Provider};
use crate::env::Task;
use crate::error::{InvariantViolation, TrainerError};
use crate::generation::{is_generation_error, ResponseCache, Sampler, SamplerSettings};
use crate::model::{AnyBackend, GenerationBackend, ScriptedBackend};
use crate::persistence::{AgentSnapshot, CheckpointRecord, EpisodeMetadata, EpisodeRecord, RunStore};
use crate::trajectory::{scorer_for, Beam, ProvisionalScorer, Trajectory, Turn};

/// Checkpoints report the mean of this many most recent winners.
const CHECKPOINT_RECENT: usize = 10;

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

/// The three generation roles a trainer needs.
#[derive(Debug)]
pub struct Backends<B> {
    /// Produces agent turns.
    pub agents: B,
    /// Scores finished conversations; `None` uses the task heuristic.
    pub judge: Option<B>,
    /// Summarizes winners into behavior snippets.
    pub summarizer: B,
}

impl Backends<AnyBackend> {
    pub fn from_config(config: &ColloquyConfig) -> AnyResult<Self> {
        let m = &config.model;
        if m.provider == Provider::Mock {
            return Ok(Self::mock(config));
        }
        let judge = if config.reward.use_llm_judge {
            Some(AnyBackend::from_config(m, &m.judge_model_id)?)
        } else {
            None
        };
        Ok(Self {
            agents: AnyBackend::from_config(m, &m.model_id)?,
            judge,
            summarizer: AnyBackend::from_config(m, &m.judge_model_id)?,
        })
    }

    /// Offline backends with canned replies, judge scores and summaries.
    pub fn mock(config: &ColloquyConfig) -> Self {
        let dims: Vec<String> = config.reward.weights.keys().cloned().collect();
        let scores = dims
            .iter()
            .enumerate()
            .map(|(i, d)| format!("\"{d}\": {}", 6 + i % 3))
            .collect::<Vec<_>>()
            .join(", ");
        let judge = config
            .reward
            .use_llm_judge
            .then(|| AnyBackend::Scripted(ScriptedBackend::new([format!("{{{scores}}}")])));

        let summary = config
            .agents
            .iter()
            .map(|a| {
                format!(
                    "\"{role}\": {{\"collaboration\": [\"Name the teammate whose idea you extend\"], \
                     \"quality\": [\"As the {role}, state one concrete number or limit\"]}}",
                    role = a.role
                )
            })
            .collect::<Vec<_>>()
            .join(", ");

        Self {
            agents: AnyBackend::Scripted(ScriptedBackend::demo()),
            judge,
            summarizer: AnyBackend::Scripted(ScriptedBackend::new([format!("{{{summary}}}")])),
        }
    }
}

// ---------------------------------------------------------------------------
// Trainer
// ---------------------------------------------------------------------------

pub struct Trainer<B, T, S> {
    config: ColloquyConfig,
    task: T,
    store: S,
    agents: Vec<Agent>,
    sampler: Sampler<B>,
    estimator: ValueEstimator<B>,
    extractor: BehaviorExtractor<B>,
    scorer: Box<dyn ProvisionalScorer>,
    library: BehaviorLibrary,
    rng: StdRng,
    cache: Arc<ResponseCache>,
    metrics: Arc<RunMetrics>,
    /// The last `behavior.history_window` winners, saved or not.
    history: Vec<EpisodeRecord>,
    /// Reward total of every winner, in episode order.
    winner_totals: Vec<f64>,
    unsaved_episodes: usize,
}

impl<B, T, S> Trainer<B, T, S>
where
    B: GenerationBackend,
    T: Task,
    S: RunStore,
{
    pub fn new(
        config: ColloquyConfig,
        task: T,
        store: S,
        backends: Backends<B>,
    ) -> Result<Self, TrainerError> {
        config.validate()?;

        let profiles = profiles_from_config(&config.agents);
        let agents = profiles
            .iter()
            .map(|p| Agent::new(p.clone(), task.initial_prompt(p, &profiles)))
            .collect();

        let cache = Arc::new(ResponseCache::new(config.cache.capacity));
        let metrics = Arc::new(RunMetrics::new());
        let sampler = Sampler::new(
            backends.agents,
            Arc::clone(&cache),
            Arc::clone(&metrics),
            SamplerSettings::from(&config.search),
        );
        let estimator =
            ValueEstimator::new(&config.reward, backends.judge, Arc::clone(&metrics))?;
        let extractor = BehaviorExtractor::new(
            backends.summarizer,
            config.behavior.top_fraction,
            config.behavior.max_prompt_episodes,
            config.reward.weights.keys().cloned().collect(),
            Arc::clone(&metrics),
        );
        let rng = match config.selection.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        info!(
            agents = config.agents.len(),
            beam_width = config.search.beam_width,
            k_samples = config.search.k_samples,
            max_turns = config.search.max_turns,
            judge = estimator.uses_judge(),
            "trainer initialised"
        );

        Ok(Self {
            scorer: scorer_for(config.search.provisional_scorer),
            config,
            task,
            store,
            agents,
            sampler,
            estimator,
            extractor,
            library: BehaviorLibrary::new(),
            rng,
            cache,
            metrics,
            history: Vec::new(),
            winner_totals: Vec::new(),
            unsaved_episodes: 0,
        })
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn library(&self) -> &BehaviorLibrary {
        &self.library
    }

    pub fn history(&self) -> &[EpisodeRecord] {
        &self.history
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn sampler(&self) -> &Sampler<B> {
        &self.sampler
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.cache.snapshot())
    }

    fn profiles(&self) -> Vec<AgentProfile> {
        self.agents.iter().map(|a| a.profile.clone()).collect()
    }

    /// Agents speak in roster order.
    fn acting_agent(&self, trajectory: &Trajectory) -> &Agent {
        &self.agents[trajectory.next_index() % self.agents.len()]
    }

    // ------------------------------------------------------------------
    // Training loop
    // ------------------------------------------------------------------

    /// Run `num_episodes` episodes sequentially and write the run summary.
    ///
    /// Aborted episodes are counted and skipped. Invariant violations and
    /// persistence failures stop the run, as does passing
    /// `run.max_budget_tokens`; the summary is still written in that case.
    pub async fn train(&mut self, num_episodes: usize) -> Result<TrainingSummary, TrainerError> {
        info!(num_episodes, "starting training");
        let update_every = self.config.behavior.update_frequency;
        let save_every = self.config.run.save_frequency;

        for episode in 1..=num_episodes {
            match self.run_episode(episode).await {
                Ok(record) => info!(
                    episode,
                    reward = record.reward.total,
                    turns = record.trajectory.len(),
                    candidates = record.metadata.candidates,
                    "episode complete"
                ),
                Err(TrainerError::EpisodeAborted { episode, reason }) => {
                    warn!(episode, %reason, "episode aborted");
                }
                Err(e) => return Err(e),
            }

            if episode % update_every == 0 {
                self.update_agent_behaviors().await;
            }
            if save_every > 0 && episode % save_every == 0 {
                self.checkpoint(episode)?;
            }

            if let Some(limit) = self.config.run.max_budget_tokens {
                let spent = self.metrics.tokens_spent();
                if spent > limit {
                    warn!(episode, spent, limit, "token budget exhausted");
                    self.write_summary(episode)?;
                    return Err(TrainerError::BudgetExhausted {
                        episode,
                        spent,
                        limit,
                    });
                }
            }
        }

        let summary = self.write_summary(num_episodes)?;
        info!(
            episodes = summary.episodes,
            mean_reward = summary.mean_reward,
            best_reward = summary.best_reward,
            "training complete"
        );
        Ok(summary)
    }

    fn write_summary(&mut self, episode: usize) -> Result<TrainingSummary, TrainerError> {
        let summary = self.summary();
        self.store
            .record_summary(&summary, &self.library)
            .map_err(|source| TrainerError::Persistence { episode, source })?;
        Ok(summary)
    }

    /// One full episode: search, evaluate, select, persist.
    pub async fn run_episode(&mut self, episode: usize) -> Result<EpisodeRecord, TrainerError> {
        let started = Instant::now();
        let task_description = self.task.reset();
        debug!(episode, task = %task_description, "episode started");

        let searched = match self.config.search.episode_timeout_secs {
            Some(secs) => {
                match tokio::time::timeout(
                    Duration::from_secs(secs),
                    self.search(episode, &task_description),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(TrainerError::EpisodeAborted {
                        episode,
                        reason: format!("timed out after {secs}s"),
                    }),
                }
            }
            None => self.search(episode, &task_description).await,
        };
        let finished = match searched {
            Ok(finished) => finished,
            Err(e) => {
                if matches!(e, TrainerError::EpisodeAborted { .. }) {
                    self.metrics.record_episode_aborted();
                }
                return Err(e);
            }
        };

        // EVALUATION
        let mut candidates = Vec::with_capacity(finished.len());
        for mut trajectory in finished {
            trajectory.done = true;
            let reward = self.estimator.evaluate(&trajectory, &self.task).await?;
            trajectory.reward = Some(reward);
            candidates.push(trajectory);
        }

        // SELECTION
        let rewards: Vec<f64> = candidates
            .iter()
            .map(|t| t.total_reward().unwrap_or(self.config.reward.default_score))
            .collect();
        let advantages = compute_advantages(&rewards);
        let selected = select_index(
            &advantages,
            self.config.selection.exploration_rate,
            &mut self.rng,
        )?;
        let candidate_count = candidates.len();
        let winner = candidates.swap_remove(selected);
        let reward = winner
            .reward
            .clone()
            .ok_or_else(|| InvariantViolation::new("selected trajectory was never scored"))?;

        let mut record = EpisodeRecord {
            episode,
            metadata: EpisodeMetadata {
                task_description,
                candidates: candidate_count,
                candidate_rewards: rewards,
                advantages,
                selected_index: selected,
                credit: credit_assignment(&winner, reward.total),
                duration_ms: started.elapsed().as_millis() as u64,
                recorded_at: Utc::now(),
            },
            trajectory: winner,
            reward,
            saved: false,
        };
        self.metrics.record_episode_completed();

        // PERSIST
        let persisted = self.store.record_episode(&record);
        record.saved = persisted.is_ok();
        self.winner_totals.push(record.reward.total);
        if !record.saved {
            self.unsaved_episodes += 1;
        }
        self.history.push(record.clone());
        let window = self.config.behavior.history_window.max(1);
        if self.history.len() > window {
            let excess = self.history.len() - window;
            self.history.drain(..excess);
        }
        persisted.map_err(|source| TrainerError::Persistence { episode, source })?;
        Ok(record)
    }

    // ------------------------------------------------------------------
    // Beam search
    // ------------------------------------------------------------------

    async fn search(
        &self,
        episode: usize,
        task_description: &str,
    ) -> Result<Vec<Trajectory>, TrainerError> {
        let max_turns = self.config.search.max_turns;
        let root = Trajectory::new(task_description, max_turns);
        let mut beam = Beam::seeded(self.config.search.beam_width, root)?;

        for turn in 0..max_turns {
            if beam.all_finished() {
                break;
            }
            beam = self.expand(beam, episode, turn).await?;
        }
        Ok(beam.into_trajectories())
    }

    /// One expansion step. Finished members keep their slots; live members
    /// branch into one child per usable sample and the children are pruned to
    /// the remaining width.
    async fn expand(
        &self,
        beam: Beam,
        episode: usize,
        turn: usize,
    ) -> Result<Beam, TrainerError> {
        let width = beam.width();
        let (frozen, live): (Vec<_>, Vec<_>) = beam
            .into_members()
            .into_iter()
            .partition(|m| m.trajectory.done);

        let mut next = Beam::new(width)?;
        let frozen_count = frozen.len();
        for member in frozen {
            next.push(member.trajectory, member.score);
        }
        if live.is_empty() {
            return Ok(next);
        }

        let k = self.config.search.k_samples;
        let mut batches: Vec<(usize, Result<Vec<String>, InvariantViolation>)> =
            stream::iter(live.iter().enumerate().map(|(i, member)| {
                let agent = self.acting_agent(&member.trajectory);
                let context = member.trajectory.context_for(&agent.profile);
                async move { (i, self.sampler.sample(agent, &context, k).await) }
            }))
            .buffer_unordered(self.config.search.max_concurrency)
            .collect()
            .await;
        batches.sort_by_key(|(i, _)| *i);

        let mut staged = Beam::new(width - frozen_count)?;
        let mut usable_batches = 0usize;
        for (i, batch) in batches {
            let batch = batch?;
            let parent = &live[i].trajectory;
            let agent = self.acting_agent(parent);
            let mut usable = false;
            for candidate in batch {
                if is_generation_error(&candidate) {
                    continue;
                }
                usable = true;
                let mut child = parent.branch();
                let index = child.next_index();
                child.add_turn(Turn::new(&agent.profile, candidate, index))?;
                if !child.done && self.task.is_episode_complete(&child) {
                    child.done = true;
                }
                let score = self.scorer.score(&child);
                staged.push(child, score);
            }
            if usable {
                usable_batches += 1;
            }
        }

        if usable_batches == 0 {
            if frozen_count == 0 {
                return Err(TrainerError::EpisodeAborted {
                    episode,
                    reason: format!("every sample failed at turn {turn}"),
                });
            }
            warn!(episode, turn, frozen = frozen_count, "every sample failed, keeping finished");
            return Ok(next);
        }

        let staged_count = staged.len();
        staged.prune();
        for member in staged.into_members() {
            next.push(member.trajectory, member.score);
        }
        debug!(
            episode,
            turn,
            live = live.len(),
            frozen = frozen_count,
            staged = staged_count,
            kept = next.len(),
            "beam expanded"
        );
        Ok(next)
    }

    // ------------------------------------------------------------------
    // Behavior updates
    // ------------------------------------------------------------------

    /// Mine recent winners and fold the snippets into agent prompts.
    ///
    /// Extraction failures leave every agent unchanged.
    pub async fn update_agent_behaviors(&mut self) {
        let min = self.config.behavior.min_episodes;
        let episodes = self.winner_totals.len();
        if episodes < min {
            info!(episodes, min, "not enough episodes for behavior extraction");
            return;
        }

        let recent: Vec<Trajectory> = self
            .history
            .iter()
            .map(|r| r.trajectory.clone())
            .collect();
        let profiles = self.profiles();

        let extracted = self
            .extractor
            .extract(&recent, &profiles, self.task.task_type())
            .await;
        if extracted.is_empty() {
            return;
        }

        let mut all: Vec<BehaviorSnippet> = extracted.values().flatten().cloned().collect();
        all.sort_by_key(|s| s.agent_id);
        let added = self.library.merge(&all);

        let max = self.config.behavior.max_behaviors;
        for agent in &mut self.agents {
            if let Some(snippets) = extracted.get(&agent.profile.id) {
                agent.prompt = apply_snippets(&agent.prompt, snippets, max);
                info!(
                    agent = %agent.profile.role,
                    version = agent.prompt.version,
                    behaviors = agent.prompt.learned_behaviors.len(),
                    "agent prompt updated"
                );
            }
        }
        info!(added, library = self.library.len(), "behavior library updated");
    }

    // ------------------------------------------------------------------
    // Checkpoints and summary
    // ------------------------------------------------------------------

    pub fn checkpoint(&mut self, episode: usize) -> Result<(), TrainerError> {
        let rewards = &self.winner_totals;
        let recent = rewards[rewards.len().saturating_sub(CHECKPOINT_RECENT)..].to_vec();
        let mean = if rewards.is_empty() {
            0.0
        } else {
            rewards.iter().sum::<f64>() / rewards.len() as f64
        };
        let best = rewards.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let checkpoint = CheckpointRecord {
            episode,
            agents: self
                .agents
                .iter()
                .map(|a| AgentSnapshot {
                    id: a.profile.id,
                    role: a.profile.role.clone(),
                    prompt: a.prompt.clone(),
                })
                .collect(),
            recent_rewards: recent,
            mean_reward: mean,
            best_reward: if best.is_finite() { best } else { 0.0 },
            recorded_at: Utc::now(),
        };
        self.store
            .record_checkpoint(&checkpoint)
            .map_err(|source| TrainerError::Persistence { episode, source })
    }

    pub fn summary(&self) -> TrainingSummary {
        let behaviors = self
            .agents
            .iter()
            .map(|a| (a.profile.role.clone(), a.prompt.learned_behaviors.len()))
            .collect();
        TrainingSummary::from_rewards(
            &self.winner_totals,
            self.unsaved_episodes,
            behaviors,
            self.metrics(),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::config::AgentConfig;
    use crate::error::{EvaluationError, GenerationError};
    use crate::persistence::MemoryRunStore;

    /// Replies `<last turn content>><call number>` after a latency that varies
    /// per call, so concurrent batches finish out of order.
    #[derive(Default)]
    struct EchoBackend {
        calls: AtomicUsize,
    }

    impl GenerationBackend for EchoBackend {
        async fn generate(
            &self,
            _system_prompt: &str,
            context: &str,
            _temperature: f64,
            _max_tokens: usize,
        ) -> Result<String, GenerationError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30 - (n % 3) as u64 * 10)).await;
            let parent = context
                .lines()
                .rev()
                .find(|l| l.starts_with("Turn "))
                .and_then(|l| l.split_once(": "))
                .map(|(_, content)| content)
                .unwrap_or("root");
            Ok(format!("{parent}>{n}"))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    /// Finishes when the last turn says DONE; scores are fixed.
    struct FixedTask {
        scores: BTreeMap<String, f64>,
    }

    impl FixedTask {
        fn new(quality: f64, collaboration: f64, efficiency: f64) -> Self {
            Self {
                scores: BTreeMap::from([
                    ("quality".to_string(), quality),
                    ("collaboration".to_string(), collaboration),
                    ("efficiency".to_string(), efficiency),
                ]),
            }
        }
    }

    impl Task for FixedTask {
        fn task_type(&self) -> &str {
            "fixed"
        }
        fn reset(&mut self) -> String {
            "Agree on a plan".into()
        }
        fn initial_prompt(&self, agent: &AgentProfile, _: &[AgentProfile]) -> String {
            format!("You are the {}.", agent.role)
        }
        fn is_episode_complete(&self, trajectory: &Trajectory) -> bool {
            trajectory
                .last_turn()
                .map(|t| t.content.contains("DONE"))
                .unwrap_or(false)
        }
        fn score(&self, _: &Trajectory) -> Result<BTreeMap<String, f64>, EvaluationError> {
            Ok(self.scores.clone())
        }
    }

    fn config(width: usize, k: usize, max_turns: usize, roles: &[&str]) -> ColloquyConfig {
        let mut config = ColloquyConfig::default();
        config.search.beam_width = width;
        config.search.k_samples = k;
        config.search.max_turns = max_turns;
        config.search.inter_call_delay_ms = 0;
        config.selection.exploration_rate = 0.0;
        config.selection.seed = Some(7);
        config.agents = roles
            .iter()
            .map(|r| AgentConfig {
                role: r.to_string(),
                goal: format!("act as {r}"),
            })
            .collect();
        config
    }

    fn trainer(
        config: ColloquyConfig,
        agents: ScriptedBackend,
        store: MemoryRunStore,
    ) -> Trainer<ScriptedBackend, FixedTask, MemoryRunStore> {
        let summarizer = ScriptedBackend::new([
            r#"{"writer": {"collaboration": ["Quote the reviewer before replying"]}, "reviewer": {"quality": ["List one risk"]}}"#,
        ]);
        Trainer::new(
            config,
            FixedTask::new(8.0, 6.0, 10.0),
            store,
            Backends {
                agents,
                judge: None,
                summarizer,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_single_path_two_agents_alternate() {
        let mut t = trainer(
            config(1, 1, 3, &["writer", "reviewer"]),
            ScriptedBackend::new(["one", "two", "three"]),
            MemoryRunStore::new(),
        );
        let record = t.run_episode(1).await.unwrap();
        assert_eq!(record.trajectory.len(), 3);
        let speakers: Vec<usize> = record.trajectory.turns().iter().map(|t| t.agent_id).collect();
        assert_eq!(speakers, vec![0, 1, 0]);
        assert_eq!(record.metadata.candidates, 1);
        assert!(record.saved);
        assert_eq!(t.store().episodes.len(), 1);
    }

    #[tokio::test]
    async fn test_first_turn_candidates_capped_by_samples() {
        let mut t = trainer(
            config(4, 2, 1, &["writer"]),
            ScriptedBackend::new(["a", "b"]),
            MemoryRunStore::new(),
        );
        let record = t.run_episode(1).await.unwrap();
        assert_eq!(record.metadata.candidates, 2);
        assert_eq!(record.metadata.candidate_rewards.len(), 2);
    }

    #[tokio::test]
    async fn test_one_failed_call_still_yields_four_candidates() {
        let mut t = trainer(
            config(5, 5, 1, &["writer"]),
            ScriptedBackend::new(["a", "b", "c", "d", "e"]).with_failures([2]),
            MemoryRunStore::new(),
        );
        let record = t.run_episode(1).await.unwrap();
        assert_eq!(record.metadata.candidates, 4);
        assert!(!is_generation_error(&record.trajectory.turns()[0].content));
        assert_eq!(t.metrics().generation_failures, 1);
    }

    #[tokio::test]
    async fn test_reward_is_weighted_sum() {
        let mut t = trainer(
            config(2, 2, 2, &["writer", "reviewer"]),
            ScriptedBackend::new(["a", "b"]),
            MemoryRunStore::new(),
        );
        let record = t.run_episode(1).await.unwrap();
        assert!((record.reward.total - 7.6).abs() < 1e-9);
        let advantage_sum: f64 = record.metadata.advantages.iter().sum();
        assert!(advantage_sum.abs() < 1e-9);
        let credit_total: f64 = record.metadata.credit.iter().map(|(_, c)| c).sum();
        assert!((credit_total - 7.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_beam_never_exceeds_width() {
        let mut t = trainer(
            config(3, 4, 4, &["writer", "reviewer"]),
            ScriptedBackend::new(["a", "b", "c", "d", "e"]),
            MemoryRunStore::new(),
        );
        let record = t.run_episode(1).await.unwrap();
        assert!(record.metadata.candidates <= 3);
        assert_eq!(record.trajectory.len(), 4);
    }

    #[tokio::test]
    async fn test_completion_stops_search_early() {
        let backend = ScriptedBackend::new(["all agreed DONE"]);
        let mut t = trainer(config(2, 2, 5, &["writer"]), backend, MemoryRunStore::new());
        let record = t.run_episode(1).await.unwrap();
        assert_eq!(record.trajectory.len(), 1);
        assert_eq!(t.sampler().backend().call_count(), 2);
    }

    #[tokio::test]
    async fn test_finished_trajectories_keep_their_slots() {
        let backend = ScriptedBackend::new(["DONE", "go on"]);
        let mut t = trainer(config(2, 2, 3, &["writer"]), backend, MemoryRunStore::new());
        let record = t.run_episode(1).await.unwrap();
        assert_eq!(record.metadata.candidates, 2);
        // Turn 0 branches twice; only the live child expands at turn 1.
        assert_eq!(t.sampler().backend().call_count(), 4);
    }

    #[tokio::test]
    async fn test_failed_turn_keeps_finished_candidates() {
        // Turn 0 yields DONE and a live child; both samples at turn 1 fail.
        let backend = ScriptedBackend::new(["DONE", "go on"]).with_failures([2, 3]);
        let mut t = trainer(config(2, 2, 3, &["writer"]), backend, MemoryRunStore::new());
        let record = t.run_episode(1).await.unwrap();
        assert_eq!(record.metadata.candidates, 1);
        assert_eq!(record.trajectory.turns()[0].content, "DONE");
        assert_eq!(t.metrics().episodes_aborted, 0);
        assert_eq!(t.store().episodes.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_children_extend_their_own_parent() {
        let mut cfg = config(3, 2, 3, &["writer", "reviewer"]);
        cfg.search.max_concurrency = 3;
        let t = Trainer::new(
            cfg,
            FixedTask::new(8.0, 6.0, 10.0),
            MemoryRunStore::new(),
            Backends {
                agents: EchoBackend::default(),
                judge: None,
                summarizer: EchoBackend::default(),
            },
        )
        .unwrap();

        let finished = t.search(1, "Agree on a plan").await.unwrap();
        assert_eq!(finished.len(), 3);
        for trajectory in &finished {
            let turns = trajectory.turns();
            assert_eq!(turns.len(), 3);
            assert!(turns[0].content.starts_with("root>"));
            for pair in turns.windows(2) {
                let prefix = format!("{}>", pair[0].content);
                assert!(pair[1].content.starts_with(&prefix), "{:?}", pair[1].content);
            }
        }
    }

    #[tokio::test]
    async fn test_all_failures_abort_without_persisting() {
        let mut t = trainer(
            config(2, 2, 3, &["writer"]),
            ScriptedBackend::failing(),
            MemoryRunStore::new(),
        );
        let err = t.run_episode(1).await.unwrap_err();
        assert!(matches!(err, TrainerError::EpisodeAborted { episode: 1, .. }));
        assert!(t.store().episodes.is_empty());
        assert!(t.history().is_empty());
        assert_eq!(t.metrics().episodes_aborted, 1);
        assert_eq!(t.sampler().cache().len(), 0);
    }

    #[tokio::test]
    async fn test_training_continues_after_aborts() {
        let mut t = trainer(
            config(1, 1, 2, &["writer"]),
            ScriptedBackend::failing(),
            MemoryRunStore::new(),
        );
        let summary = t.train(2).await.unwrap();
        assert_eq!(summary.episodes, 0);
        assert_eq!(summary.metrics.episodes_aborted, 2);
        assert!(t.store().summary.is_some());
    }

    #[tokio::test]
    async fn test_timeout_aborts_episode() {
        let mut cfg = config(1, 1, 3, &["writer"]);
        cfg.search.episode_timeout_secs = Some(1);
        let backend = ScriptedBackend::new(["slow"]).with_latency(Duration::from_millis(1500));
        let mut t = trainer(cfg, backend, MemoryRunStore::new());
        let err = t.run_episode(1).await.unwrap_err();
        match err {
            TrainerError::EpisodeAborted { reason, .. } => assert!(reason.contains("timed out")),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(t.store().episodes.is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_marks_unsaved() {
        let mut t = trainer(
            config(1, 1, 1, &["writer"]),
            ScriptedBackend::new(["a"]),
            MemoryRunStore::rejecting(),
        );
        let err = t.run_episode(1).await.unwrap_err();
        assert!(matches!(err, TrainerError::Persistence { episode: 1, .. }));
        assert_eq!(t.history().len(), 1);
        assert!(!t.history()[0].saved);
        assert_eq!(t.summary().unsaved_episodes, 1);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_stops_run_with_summary() {
        let mut cfg = config(1, 1, 1, &["writer"]);
        cfg.run.max_budget_tokens = Some(1);
        let mut t = trainer(cfg, ScriptedBackend::new(["a"]), MemoryRunStore::new());
        let err = t.train(3).await.unwrap_err();
        match err {
            TrainerError::BudgetExhausted { episode, spent, limit } => {
                assert_eq!(episode, 1);
                assert_eq!(limit, 1);
                assert!(spent > 1);
            }
            other => panic!("unexpected error {other:?}"),
        }
        let summary = t.store().summary.as_ref().unwrap();
        assert_eq!(summary.episodes, 1);
        assert_eq!(summary.tokens_spent, t.metrics().tokens_spent);
        assert_eq!(t.store().episodes.len(), 1);
    }

    #[tokio::test]
    async fn test_history_keeps_window_but_counts_all_episodes() {
        let mut cfg = config(1, 1, 1, &["writer"]);
        cfg.behavior.history_window = 2;
        let mut t = trainer(cfg, ScriptedBackend::new(["a"]), MemoryRunStore::new());
        let summary = t.train(3).await.unwrap();
        assert_eq!(t.history().len(), 2);
        assert_eq!(t.history()[0].episode, 2);
        assert_eq!(summary.episodes, 3);
        assert!((summary.mean_reward - 7.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_behavior_update_reaches_next_prompt() {
        let mut cfg = config(1, 1, 2, &["writer", "reviewer"]);
        cfg.behavior.update_frequency = 2;
        cfg.behavior.min_episodes = 2;
        cfg.run.save_frequency = 2;
        let mut t = trainer(
            cfg,
            ScriptedBackend::new(["first", "second"]),
            MemoryRunStore::new(),
        );
        let summary = t.train(3).await.unwrap();

        let writer = &t.agents()[0];
        assert_eq!(writer.prompt.version, 1);
        assert_eq!(
            writer.prompt.learned_behaviors,
            vec!["Quote the reviewer before replying".to_string()]
        );
        assert_eq!(t.library().len(), 2);
        assert_eq!(summary.agent_behaviors["reviewer"], 1);
        assert_eq!(t.store().checkpoints.len(), 1);
        assert_eq!(t.store().checkpoints[0].episode, 2);

        // Episode three misses the cache because the writer's prompt changed.
        let calls = t.sampler().backend().calls();
        assert!(calls
            .iter()
            .any(|c| c.system_prompt.contains("Quote the reviewer before replying")));
    }

    #[tokio::test]
    async fn test_behavior_update_needs_min_episodes() {
        let mut cfg = config(1, 1, 1, &["writer"]);
        cfg.behavior.update_frequency = 1;
        cfg.behavior.min_episodes = 5;
        let mut t = trainer(cfg, ScriptedBackend::new(["a"]), MemoryRunStore::new());
        t.train(2).await.unwrap();
        assert!(t.library().is_empty());
        assert_eq!(t.agents()[0].prompt.version, 0);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut cfg = config(1, 1, 1, &["writer"]);
        cfg.reward.weights.insert("quality".into(), 0.9);
        let result = Trainer::new(
            cfg,
            FixedTask::new(1.0, 1.0, 1.0),
            MemoryRunStore::new(),
            Backends {
                agents: ScriptedBackend::new(["a"]),
                judge: None,
                summarizer: ScriptedBackend::new(["{}"]),
            },
        );
        assert!(matches!(result, Err(TrainerError::Invariant(_))));
    }

    #[test]
    fn test_mock_backends_follow_config() {
        let mut cfg = ColloquyConfig::default();
        cfg.reward.use_llm_judge = true;
        let backends = Backends::mock(&cfg);
        assert!(backends.judge.is_some());
        assert!(matches!(backends.agents, AnyBackend::Scripted(_)));
    }
}
