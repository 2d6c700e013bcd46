//! One reconciliation run over a window of email.
//!
//! Snapshot once, fetch once, then walk the emails oldest first. A failed
//! snapshot read or email fetch aborts the run; anything that goes wrong
//! with a single email is logged, recorded and the batch moves on.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::RunConfig;
use crate::error::{DatabaseError, PipelineError};
use crate::extract::Extractor;
use crate::mail::{EmailSource, RawEmail, RelevanceRules};
use crate::pipeline::types::{EmailOutcome, EmailReport, FailureStage, RunReport, SkipKind};
use crate::store::{Ledger, TrackingStore};
use crate::tracker::{ApplicationId, ExtractedFact, ReconciliationDecision, Reconciler, Snapshot};

/// Run-time switches.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Pause after each email that reached extraction.
    pub pace: Duration,
    /// Decide but never write to the store or the ledger.
    pub dry_run: bool,
    /// Process emails the ledger already settled.
    pub ignore_ledger: bool,
    /// Fold each applied decision into the snapshot so later emails in the
    /// same run see it.
    pub apply_in_run: bool,
}

impl From<&RunConfig> for RunOptions {
    fn from(config: &RunConfig) -> Self {
        Self {
            pace: config.pace,
            dry_run: config.dry_run,
            ignore_ledger: config.ignore_ledger,
            apply_in_run: config.apply_in_run,
        }
    }
}

pub struct RunOrchestrator {
    source: Arc<dyn EmailSource>,
    extractor: Arc<dyn Extractor>,
    store: Arc<dyn TrackingStore>,
    ledger: Option<Arc<Ledger>>,
    rules: RelevanceRules,
    reconciler: Reconciler,
    options: RunOptions,
}

impl RunOrchestrator {
    pub fn new(
        source: Arc<dyn EmailSource>,
        extractor: Arc<dyn Extractor>,
        store: Arc<dyn TrackingStore>,
        options: RunOptions,
    ) -> Self {
        Self {
            source,
            extractor,
            store,
            ledger: None,
            rules: RelevanceRules::default_rules(),
            reconciler: Reconciler::default(),
            options,
        }
    }

    pub fn with_ledger(mut self, ledger: Arc<Ledger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn with_rules(mut self, rules: RelevanceRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_reconciler(mut self, reconciler: Reconciler) -> Self {
        self.reconciler = reconciler;
        self
    }

    /// Process every email received within `window`.
    pub async fn run(&self, window: Duration) -> Result<RunReport, PipelineError> {
        let started_at = Utc::now();
        let mut report = RunReport::new(Uuid::new_v4(), self.options.dry_run);
        let cost_before = self.extractor.total_cost();

        let rows = self
            .store
            .list_all()
            .await
            .map_err(PipelineError::Snapshot)?;
        let mut snapshot = Snapshot::new(rows);

        let emails = self
            .source
            .fetch_recent(window)
            .await
            .map_err(PipelineError::EmailFetch)?;

        let statuses = snapshot
            .status_counts()
            .iter()
            .map(|(status, n)| format!("{status}={n}"))
            .collect::<Vec<_>>()
            .join(" ");
        info!(
            run_id = %report.run_id,
            store = self.store.name(),
            source = self.source.name(),
            rows = snapshot.len(),
            %statuses,
            missing_source = snapshot.missing_source_count(),
            duplicates = snapshot.shadowed_count(),
            emails = emails.len(),
            dry_run = self.options.dry_run,
            "Run started"
        );

        let count = emails.len();
        for (i, email) in emails.iter().enumerate() {
            let gate = match self.gate(email).await {
                Ok(gate) => gate,
                Err(e) => return Err(self.interrupted(e, report, started_at, cost_before).await),
            };
            let (fact, outcome) = match gate {
                Some(skip) => (None, skip),
                None => match self.process(i, email, &mut snapshot).await {
                    Processed::Done { fact, outcome } => {
                        if i + 1 < count && !self.options.pace.is_zero() {
                            tokio::time::sleep(self.options.pace).await;
                        }
                        (fact, outcome)
                    }
                    Processed::Abort { outcome, reason } => {
                        if let Err(e) = self.finish_email(&mut report, email, None, outcome).await {
                            return Err(self.interrupted(e, report, started_at, cost_before).await);
                        }
                        error!(run_id = %report.run_id, %reason, "Stopping batch");
                        report.aborted = Some(reason);
                        break;
                    }
                },
            };
            if let Err(e) = self.finish_email(&mut report, email, fact, outcome).await {
                return Err(self.interrupted(e, report, started_at, cost_before).await);
            }
        }

        report.llm_cost = self.extractor.total_cost() - cost_before;

        if let Some(ledger) = self.ledger.as_ref().filter(|_| !self.options.dry_run)
            && let Err(e) = ledger.record_run(&report, started_at).await
        {
            warn!(error = %e, "Failed to record run totals");
        }

        info!(run_id = %report.run_id, "{}", report.summary());
        Ok(report)
    }

    /// Close out a run the ledger broke. The partial report is logged and
    /// handed back in the error.
    async fn interrupted(
        &self,
        source: DatabaseError,
        mut report: RunReport,
        started_at: DateTime<Utc>,
        cost_before: Decimal,
    ) -> PipelineError {
        report.llm_cost = self.extractor.total_cost() - cost_before;
        error!(
            run_id = %report.run_id,
            error = %source,
            "Ledger failed, stopping run. Partial: {}",
            report.summary()
        );
        if let Some(ledger) = self.ledger.as_ref().filter(|_| !self.options.dry_run)
            && let Err(e) = ledger.record_run(&report, started_at).await
        {
            warn!(error = %e, "Failed to record partial run totals");
        }
        PipelineError::Interrupted {
            source,
            partial: Box::new(report),
        }
    }

    /// Ledger and relevance checks. `Some` means do not extract.
    async fn gate(&self, email: &RawEmail) -> Result<Option<EmailOutcome>, DatabaseError> {
        if !self.options.ignore_ledger
            && let Some(ledger) = &self.ledger
            && ledger.is_processed(&email.id).await?
        {
            debug!(email_id = %email.id, "Already processed");
            return Ok(Some(EmailOutcome::Skipped {
                kind: SkipKind::Ledger,
                reason: "already processed".into(),
            }));
        }

        Ok(self.rules.evaluate(email).map(|reason| {
            info!(email_id = %email.id, subject = %email.subject, %reason, "Skipping email");
            EmailOutcome::Skipped {
                kind: SkipKind::Filter,
                reason: reason.0,
            }
        }))
    }

    /// Extract, reconcile, apply.
    async fn process(&self, index: usize, email: &RawEmail, snapshot: &mut Snapshot) -> Processed {
        let fact = match self.extractor.extract(&email.extraction_text()).await {
            Ok(fact) => fact,
            Err(e) => {
                warn!(email_id = %email.id, subject = %email.subject, error = %e, "Extraction failed");
                let outcome = EmailOutcome::Failed {
                    stage: FailureStage::Extraction,
                    error: e.to_string(),
                };
                return if e.is_fatal() {
                    Processed::Abort {
                        outcome,
                        reason: format!("extractor unavailable: {e}"),
                    }
                } else {
                    Processed::Done {
                        fact: None,
                        outcome,
                    }
                };
            }
        };

        let decision = self.reconciler.reconcile(snapshot, &fact);
        debug!(
            email_id = %email.id,
            company = %fact.company,
            role = %fact.role,
            status = %fact.status,
            decision = decision.label(),
            "Reconciled"
        );

        let outcome = self.apply(index, email, decision, snapshot).await;
        Processed::Done {
            fact: Some(fact),
            outcome,
        }
    }

    async fn apply(
        &self,
        index: usize,
        email: &RawEmail,
        decision: ReconciliationDecision,
        snapshot: &mut Snapshot,
    ) -> EmailOutcome {
        match decision {
            ReconciliationDecision::NoOp { reason } => {
                info!(email_id = %email.id, %reason, "No change");
                EmailOutcome::NoOp { reason }
            }
            ReconciliationDecision::Insert(record) => {
                let id = if self.options.dry_run {
                    info!(company = %record.company, role = %record.role, status = %record.status, "Would insert");
                    None
                } else {
                    match self.store.insert(&record).await {
                        Ok(id) => {
                            info!(id = %id, company = %record.company, role = %record.role, status = %record.status, "Inserted");
                            Some(id)
                        }
                        Err(e) => {
                            error!(email_id = %email.id, company = %record.company, role = %record.role, error = %e, "Insert failed");
                            return EmailOutcome::Failed {
                                stage: FailureStage::Store,
                                error: e.to_string(),
                            };
                        }
                    }
                };
                if self.options.apply_in_run {
                    let local = id
                        .clone()
                        .unwrap_or_else(|| ApplicationId::new(format!("dry-run-{index}")));
                    snapshot.record_insert(local, &record);
                }
                EmailOutcome::Inserted { id, record }
            }
            ReconciliationDecision::Update { id, changes } => {
                if self.options.dry_run {
                    info!(id = %id, %changes, "Would update");
                } else if let Err(e) = self.store.update(&id, &changes).await {
                    error!(email_id = %email.id, id = %id, %changes, error = %e, "Update failed");
                    return EmailOutcome::Failed {
                        stage: FailureStage::Store,
                        error: e.to_string(),
                    };
                } else {
                    info!(id = %id, %changes, "Updated");
                }
                if self.options.apply_in_run {
                    snapshot.record_update(&id, &changes);
                }
                EmailOutcome::Updated { id, changes }
            }
        }
    }

    /// Add the email to the report, then to the ledger. The report keeps
    /// the email even if the ledger write fails.
    async fn finish_email(
        &self,
        report: &mut RunReport,
        email: &RawEmail,
        fact: Option<ExtractedFact>,
        outcome: EmailOutcome,
    ) -> Result<(), DatabaseError> {
        let recorded = outcome.ledger_outcome();
        let detail = outcome.detail();

        report.push(EmailReport {
            email_id: email.id.clone(),
            subject: email.subject.clone(),
            received_at: email.received_at,
            fact,
            outcome,
        });

        if !self.options.dry_run
            && let Some(ledger) = &self.ledger
            && let Some(recorded) = recorded
        {
            ledger
                .record(
                    &email.id,
                    &email.subject,
                    recorded,
                    detail.as_deref(),
                    &report.run_id.to_string(),
                )
                .await?;
        }
        Ok(())
    }
}

enum Processed {
    Done {
        fact: Option<ExtractedFact>,
        outcome: EmailOutcome,
    },
    /// Record this email's outcome, then stop the batch.
    Abort { outcome: EmailOutcome, reason: String },
}
