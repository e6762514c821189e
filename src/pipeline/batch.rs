//! Scoring and risk evaluation batch.
//!
//! Steps run in a fixed order:
//! 1. Purge expositions older than the contagious period
//! 2. Reset stale risk levels
//! 3. Validate and score pending contacts
//! 4. Evaluate risk (skipped in [`BatchMode::None`])
//!
//! Every step fans out per record on the batch thread pool. A store error
//! ends the batch; validation problems never do.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::clock::{RobertClock, RobertInstant};
use crate::config::RobertConfig;
use crate::error::{ConfigError, RobertResult};
use crate::metrics::{BatchMetrics, MetricsSnapshot};
use crate::oracle::CryptoOracle;
use crate::risk::{EpochRetentionPurger, ResetDecision, RiskEvaluator, RiskReset};
use crate::scoring::ExposureAggregator;
use crate::storage::{ContactRepository, Registration, RegistrationRepository};
use crate::validation::{ContactValidator, ToleranceCheck};
use crate::{log_error, log_info};

use super::contact_processing::ContactProcessor;
use super::context::BatchContext;

/// Which registrations the risk evaluation step looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchMode {
    /// Registrations flagged `outdatedRisk` by contact scoring.
    #[default]
    ScoreContactsAndComputeRisk,
    /// Every registration.
    FullRegistrationScanComputeRisk,
    /// No risk evaluation.
    None,
}

impl BatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchMode::ScoreContactsAndComputeRisk => "SCORE_CONTACTS_AND_COMPUTE_RISK",
            BatchMode::FullRegistrationScanComputeRisk => "FULL_REGISTRATION_SCAN_COMPUTE_RISK",
            BatchMode::None => "NONE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStep {
    PurgeOldEpochExpositions,
    RiskLevelReset,
    ContactScoring,
    RiskEvaluation,
}

impl fmt::Display for BatchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchStep::PurgeOldEpochExpositions => "PURGE_OLD_EPOCH_EXPOSITIONS",
            BatchStep::RiskLevelReset => "RISK_LEVEL_RESET",
            BatchStep::ContactScoring => "CONTACT_SCORING",
            BatchStep::RiskEvaluation => "RISK_EVALUATION",
        };
        f.write_str(name)
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: BatchStep,
    /// Records read by the step.
    pub processed: usize,
    /// Records the step changed.
    pub affected: usize,
    pub duration_ms: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub batch_id: String,
    pub steps: Vec<StepReport>,
    pub metrics: MetricsSnapshot,
}

impl BatchReport {
    pub fn step(&self, step: BatchStep) -> Option<&StepReport> {
        self.steps.iter().find(|report| report.step == step)
    }
}

pub struct RiskBatch {
    clock: RobertClock,
    mode: BatchMode,
    purger: EpochRetentionPurger,
    reset: RiskReset,
    contact_processor: ContactProcessor,
    evaluator: RiskEvaluator,
    registrations: Arc<dyn RegistrationRepository>,
    contacts: Arc<dyn ContactRepository>,
    pool: rayon::ThreadPool,
}

impl RiskBatch {
    pub fn new(
        config: &RobertConfig,
        oracle: Arc<dyn CryptoOracle>,
        registrations: Arc<dyn RegistrationRepository>,
        contacts: Arc<dyn ContactRepository>,
    ) -> RobertResult<Self> {
        config.validate()?;
        let clock = config.clock()?;
        let strategy = config.scoring.build(config.epoch_duration_secs)?;

        let validator = ContactValidator::new(
            oracle,
            ToleranceCheck::new(clock, config.hello_message_timestamp_tolerance),
            config.server_country_code,
        );
        let contact_processor =
            ContactProcessor::new(validator, ExposureAggregator::new(strategy.clone()));
        let retention_days = i64::from(config.risk_level_retention_period_days);

        let mut pool =
            rayon::ThreadPoolBuilder::new().thread_name(|i| format!("robert-batch-{}", i));
        if let Some(threads) = config.worker_threads {
            pool = pool.num_threads(threads);
        }
        let pool = pool
            .build()
            .map_err(|e| ConfigError::invalid("workerThreads", e.to_string()))?;

        Ok(Self {
            clock,
            mode: config.batch_mode,
            purger: EpochRetentionPurger::new(&clock, config.contagious_period_days),
            reset: RiskReset::new(retention_days),
            contact_processor,
            evaluator: RiskEvaluator::new(strategy, config.risk_threshold, retention_days),
            registrations,
            contacts,
            pool,
        })
    }

    pub fn run(&self) -> RobertResult<BatchReport> {
        self.run_at(self.clock.now())
    }

    /// Run every step with `now` as the reference instant.
    pub fn run_at(&self, now: RobertInstant) -> RobertResult<BatchReport> {
        let ctx = BatchContext::at(now);
        let metrics = BatchMetrics::new();
        let log_ctx = ctx.log_context();

        let mut steps = vec![
            self.step(BatchStep::PurgeOldEpochExpositions, &ctx, || {
                self.purge_old_epoch_expositions(&ctx, &metrics)
            })?,
            self.step(BatchStep::RiskLevelReset, &ctx, || {
                self.reset_risk_levels(&ctx, &metrics)
            })?,
            self.step(BatchStep::ContactScoring, &ctx, || {
                self.score_contacts(&ctx, &metrics)
            })?,
        ];
        if self.mode != BatchMode::None {
            steps.push(self.step(BatchStep::RiskEvaluation, &ctx, || {
                self.evaluate_risks(&ctx, &metrics)
            })?);
        }

        let metrics = metrics.snapshot();
        log_info!(
            log_ctx,
            "BATCH_COMPLETE",
            mode = self.mode.as_str(),
            contacts = metrics.contacts_processed,
            accepted = metrics.contacts_accepted,
            discarded = metrics.contacts_discarded_total(),
            risks_detected = metrics.risks_detected,
            resets = metrics.risk_resets_notified + metrics.risk_resets_never_notified
        );

        Ok(BatchReport {
            batch_id: ctx.batch_id.clone(),
            steps,
            metrics,
        })
    }

    fn step<F>(&self, step: BatchStep, ctx: &BatchContext, run: F) -> RobertResult<StepReport>
    where
        F: FnOnce() -> RobertResult<(usize, usize)> + Send,
    {
        let log_ctx = ctx.log_context();
        log_info!(log_ctx, "BATCH_STEP_START", step = step);
        let started = Instant::now();

        let (processed, affected) = self.pool.install(run).map_err(|e| {
            log_error!(log_ctx, "BATCH_STEP_FAILED", step = step, error = e);
            e
        })?;

        let report = StepReport {
            step,
            processed,
            affected,
            duration_ms: started.elapsed().as_millis(),
        };
        log_info!(
            log_ctx,
            "BATCH_STEP_END",
            step = step,
            processed = processed,
            affected = affected,
            duration_ms = report.duration_ms
        );
        Ok(report)
    }

    /// Apply `update` to each registration in parallel, saving those it
    /// reports as changed. Returns `(processed, changed)`.
    fn sweep<F>(&self, registrations: Vec<Registration>, update: F) -> RobertResult<(usize, usize)>
    where
        F: Fn(&mut Registration) -> bool + Sync,
    {
        let processed = registrations.len();
        let changed = registrations
            .into_par_iter()
            .map(|mut registration| -> RobertResult<usize> {
                if update(&mut registration) {
                    self.registrations.save(registration)?;
                    Ok(1)
                } else {
                    Ok(0)
                }
            })
            .collect::<RobertResult<Vec<usize>>>()?
            .into_iter()
            .sum();
        Ok((processed, changed))
    }

    pub fn purge_old_epoch_expositions(
        &self,
        ctx: &BatchContext,
        metrics: &BatchMetrics,
    ) -> RobertResult<(usize, usize)> {
        let current_epoch = ctx.current_epoch();
        log_info!(
            ctx.log_context(),
            "EPOCH_PURGE_BOUNDARY",
            current_epoch = current_epoch,
            boundary = self.purger.purge_boundary(current_epoch)
        );
        self.sweep(self.registrations.find_all()?, |registration| {
            let purged = self.purger.purge(registration, current_epoch);
            if purged > 0 {
                let log_ctx = ctx.registration_context(&registration.permanent_identifier);
                log_info!(log_ctx, "EPOCH_EXPOSITIONS_PURGED", count = purged);
                metrics.record_purged(purged);
            }
            purged > 0
        })
    }

    pub fn reset_risk_levels(
        &self,
        ctx: &BatchContext,
        metrics: &BatchMetrics,
    ) -> RobertResult<(usize, usize)> {
        let at_risk: Vec<Registration> = self
            .registrations
            .find_all()?
            .into_iter()
            .filter(|registration| registration.at_risk)
            .collect();
        self.sweep(at_risk, |registration| {
            let log_ctx = ctx.registration_context(&registration.permanent_identifier);
            match self.reset.apply(registration, ctx.now, &log_ctx) {
                ResetDecision::Reset { notified } => {
                    metrics.record_risk_reset(notified);
                    true
                }
                ResetDecision::Unchanged => false,
            }
        })
    }

    pub fn score_contacts(
        &self,
        ctx: &BatchContext,
        metrics: &BatchMetrics,
    ) -> RobertResult<(usize, usize)> {
        let report = self.contact_processor.process_all(
            self.contacts.as_ref(),
            self.registrations.as_ref(),
            ctx,
            metrics,
        )?;
        Ok((report.processed, report.registrations_updated))
    }

    pub fn evaluate_risks(
        &self,
        ctx: &BatchContext,
        metrics: &BatchMetrics,
    ) -> RobertResult<(usize, usize)> {
        let candidates: Vec<Registration> = self
            .registrations
            .find_all()?
            .into_iter()
            .filter(|registration| match self.mode {
                BatchMode::FullRegistrationScanComputeRisk => true,
                BatchMode::ScoreContactsAndComputeRisk => registration.outdated_risk,
                BatchMode::None => false,
            })
            .collect();

        let detected = AtomicUsize::new(0);
        let (processed, _) = self.sweep(candidates, |registration| {
            let log_ctx = ctx.registration_context(&registration.permanent_identifier);
            let evaluation = self.evaluator.evaluate(
                registration,
                ctx.now,
                &mut rand::thread_rng(),
                &log_ctx,
            );
            if evaluation.risk_detected {
                metrics.record_risk_detected();
                detected.fetch_add(1, Ordering::Relaxed);
            }
            true
        })?;
        Ok((processed, detected.into_inner()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Ebid;
    use crate::error::{RobertError, StoreError};
    use crate::oracle::ScriptedOracle;
    use crate::storage::{
        Contact, HelloMessageDetail, InMemoryContactRepository, InMemoryRegistrationRepository,
        PermanentIdentifier,
    };
    use chrono::Duration;

    const EPOCH: i32 = 5000;

    struct Fixture {
        oracle: Arc<ScriptedOracle>,
        registrations: Arc<InMemoryRegistrationRepository>,
        contacts: Arc<InMemoryContactRepository>,
        clock: RobertClock,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                oracle: Arc::new(ScriptedOracle::new()),
                registrations: Arc::new(InMemoryRegistrationRepository::new()),
                contacts: Arc::new(InMemoryContactRepository::new()),
                clock: RobertConfig::default().clock().unwrap(),
            }
        }

        fn batch(&self, config: RobertConfig) -> RiskBatch {
            RiskBatch::new(
                &config,
                self.oracle.clone(),
                self.registrations.clone(),
                self.contacts.clone(),
            )
            .unwrap()
        }

        fn register(&self, id: &[u8]) -> PermanentIdentifier {
            let id = PermanentIdentifier::new(id.to_vec()).unwrap();
            self.registrations.save(Registration::new(id.clone())).unwrap();
            id
        }

        /// Fifteen minutes of close contact during `EPOCH`.
        fn add_contact(&self, ebid: u8, id: &[u8]) {
            self.oracle.resolve(Ebid([ebid; 8]), id, 33, EPOCH);
            let start = self.clock.at_epoch(EPOCH);
            let messages = (0..15)
                .map(|minute| {
                    let at = start.plus(Duration::minutes(minute));
                    HelloMessageDetail::new(
                        vec![minute as u8 + 1; 5],
                        at.as_16_less_significant_bits(),
                        at.as_ntp_timestamp(),
                        -20,
                    )
                    .unwrap()
                })
                .collect();
            let contact = Contact::new(&[ebid; 8], &[0x21], messages).unwrap();
            self.contacts.save_all(vec![contact]).unwrap();
        }

        fn now(&self) -> RobertInstant {
            self.clock.at_epoch(EPOCH + 10)
        }
    }

    #[test]
    fn test_batch_mode_serde_names() {
        let mode: BatchMode = serde_json::from_str("\"NONE\"").unwrap();
        assert_eq!(mode, BatchMode::None);
        assert_eq!(
            serde_json::to_string(&BatchMode::ScoreContactsAndComputeRisk).unwrap(),
            format!("\"{}\"", BatchMode::ScoreContactsAndComputeRisk.as_str())
        );
        assert_eq!(BatchMode::default(), BatchMode::ScoreContactsAndComputeRisk);
    }

    #[test]
    fn test_steps_run_in_order() {
        let fixture = Fixture::new();
        let report = fixture.batch(RobertConfig::default()).run_at(fixture.now()).unwrap();

        let steps: Vec<BatchStep> = report.steps.iter().map(|s| s.step).collect();
        assert_eq!(
            steps,
            vec![
                BatchStep::PurgeOldEpochExpositions,
                BatchStep::RiskLevelReset,
                BatchStep::ContactScoring,
                BatchStep::RiskEvaluation,
            ]
        );
        assert!(report.batch_id.starts_with("batch-"));
    }

    #[test]
    fn test_two_contacts_in_one_epoch_raise_risk() {
        let fixture = Fixture::new();
        let id = fixture.register(b"user1");
        fixture.add_contact(1, b"user1");
        fixture.add_contact(2, b"user1");

        let report = fixture.batch(RobertConfig::default()).run_at(fixture.now()).unwrap();

        let registration = fixture.registrations.find_by_id(&id).unwrap().unwrap();
        assert_eq!(registration.exposed_epochs.len(), 1);
        assert_eq!(registration.exposed_epochs[0].epoch_id, EPOCH);
        assert_eq!(registration.exposed_epochs[0].exposition_scores.len(), 2);
        assert!(registration.at_risk);
        assert!(!registration.outdated_risk);
        assert_eq!(registration.latest_risk_epoch, EPOCH);

        assert_eq!(fixture.contacts.count().unwrap(), 0);
        assert_eq!(report.metrics.contacts_accepted, 2);
        assert_eq!(report.metrics.risks_detected, 1);
        assert_eq!(report.step(BatchStep::RiskEvaluation).unwrap().affected, 1);
    }

    #[test]
    fn test_single_contact_stays_below_threshold() {
        let fixture = Fixture::new();
        let id = fixture.register(b"user1");
        fixture.add_contact(1, b"user1");

        fixture.batch(RobertConfig::default()).run_at(fixture.now()).unwrap();

        let registration = fixture.registrations.find_by_id(&id).unwrap().unwrap();
        assert_eq!(registration.exposed_epochs.len(), 1);
        assert!(!registration.at_risk);
        assert!(!registration.outdated_risk);
    }

    #[test]
    fn test_mode_none_skips_risk_evaluation() {
        let fixture = Fixture::new();
        let id = fixture.register(b"user1");
        fixture.add_contact(1, b"user1");
        fixture.add_contact(2, b"user1");

        let config = RobertConfig {
            batch_mode: BatchMode::None,
            ..Default::default()
        };
        let report = fixture.batch(config).run_at(fixture.now()).unwrap();

        assert!(report.step(BatchStep::RiskEvaluation).is_none());
        let registration = fixture.registrations.find_by_id(&id).unwrap().unwrap();
        assert!(!registration.at_risk);
        assert!(registration.outdated_risk);
    }

    #[test]
    fn test_full_scan_evaluates_every_registration() {
        let fixture = Fixture::new();
        let id = fixture.register(b"user1");
        let mut registration = fixture.registrations.find_by_id(&id).unwrap().unwrap();
        registration.add_exposure_scores(EPOCH, &[14.0, 14.0]);
        fixture.registrations.save(registration).unwrap();

        let default_run = fixture.batch(RobertConfig::default()).run_at(fixture.now()).unwrap();
        assert_eq!(default_run.step(BatchStep::RiskEvaluation).unwrap().processed, 0);

        let config = RobertConfig {
            batch_mode: BatchMode::FullRegistrationScanComputeRisk,
            ..Default::default()
        };
        let full_scan = fixture.batch(config).run_at(fixture.now()).unwrap();
        assert_eq!(full_scan.step(BatchStep::RiskEvaluation).unwrap().processed, 1);
        assert!(fixture.registrations.find_by_id(&id).unwrap().unwrap().at_risk);
    }

    #[test]
    fn test_unavailable_store_fails_the_batch() {
        let fixture = Fixture::new();
        fixture.register(b"user1");
        fixture.registrations.set_unavailable(true);

        let result = fixture.batch(RobertConfig::default()).run_at(fixture.now());
        assert!(matches!(
            result,
            Err(RobertError::Store(StoreError::Unavailable(_)))
        ));
    }

    #[test]
    fn test_worker_threads_are_configurable() {
        let fixture = Fixture::new();
        let config = RobertConfig {
            worker_threads: Some(2),
            ..Default::default()
        };
        let batch = fixture.batch(config);
        assert_eq!(batch.pool.current_num_threads(), 2);

        let invalid = RobertConfig {
            worker_threads: Some(0),
            ..Default::default()
        };
        assert!(RiskBatch::new(
            &invalid,
            fixture.oracle.clone(),
            fixture.registrations.clone(),
            fixture.contacts.clone(),
        )
        .is_err());
    }
}
