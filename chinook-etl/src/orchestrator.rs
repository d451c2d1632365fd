//! Pipeline Orchestrator
//!
//! Runs the fixed report plan against one read-only connection:
//! extract → aggregate → (rank) → write, one report at a time.
//!
//! # State machine
//! `NotStarted → Running → {Completed, Failed}`
//!
//! # Error Handling
//! - Any step error is fatal: the run moves to `Failed`, remaining steps are
//!   skipped, and the error is returned to the caller. No retries.
//! - The connection is closed on every exit path of [`Orchestrator::run`].
//! - An optional deadline is checked between steps, never mid-step.

use crate::aggregate::{self, strategy_for};
use crate::rank;
use crate::sink::{self, header_for};
use crate::source::{Filter, SourceReader};
use chinook_common::config::{PipelineConfig, ReportId, ResolvedReport};
use chinook_common::{Error, Result};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, info_span, Dispatch, Instrument};
use uuid::Uuid;

/// Name of the step that opens the source connection
pub const CONNECT_STEP: &str = "connect";

/// Lifecycle of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum RunState {
    NotStarted,
    Running,
    Completed,
    Failed,
}

/// How a single step ended
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum StepStatus {
    Succeeded { rows: usize },
    Failed { error: String },
}

/// Outcome of one executed step
#[derive(Debug, Clone, serde::Serialize)]
pub struct StepOutcome {
    pub name: String,
    pub status: StepStatus,
    pub elapsed: Duration,
}

/// Ephemeral record of one run; never persisted
#[derive(Debug, Clone, serde::Serialize)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub state: RunState,
    pub steps: Vec<StepOutcome>,
    pub elapsed: Duration,
}

impl PipelineRun {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            state: RunState::NotStarted,
            steps: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }
}

/// Progress events for callers that want more than log lines
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    RunStarted {
        run_id: Uuid,
        total_steps: usize,
    },
    StepStarted {
        step: String,
        step_index: usize,
    },
    StepCompleted {
        step: String,
        rows: usize,
        elapsed_ms: u128,
    },
    RunCompleted {
        elapsed_ms: u128,
    },
    RunFailed {
        step: String,
        error: String,
        elapsed_ms: u128,
    },
}

/// Sequences the report plan and owns the run state
pub struct Orchestrator {
    config: PipelineConfig,
    log_sink: Dispatch,
    event_tx: Option<mpsc::Sender<PipelineEvent>>,
    deadline: Option<Instant>,
    run: PipelineRun,
}

impl Orchestrator {
    /// Create an orchestrator logging to `log_sink`
    pub fn new(config: PipelineConfig, log_sink: Dispatch) -> Self {
        Self {
            config,
            log_sink,
            event_tx: None,
            deadline: None,
            run: PipelineRun::new(),
        }
    }

    /// Report progress on an event channel
    pub fn with_events(mut self, event_tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Abort between steps once `deadline` has passed
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn state(&self) -> RunState {
        self.run.state
    }

    pub fn run_record(&self) -> &PipelineRun {
        &self.run
    }

    /// Reports in execution order
    pub fn plan(&self) -> Vec<ResolvedReport> {
        ReportId::ALL
            .iter()
            .map(|id| self.config.report(*id))
            .collect()
    }

    /// Execute the whole plan once
    ///
    /// Returns the first step error; the run record stays available through
    /// [`Orchestrator::run_record`] either way.
    pub async fn run(&mut self) -> Result<&PipelineRun> {
        if self.run.state != RunState::NotStarted {
            return Err(Error::InvalidArgument(format!(
                "Pipeline run {} was already started",
                self.run.run_id
            )));
        }

        let dispatch = self.log_sink.clone();
        let run_id = self.run.run_id;
        // The span must belong to the sink, not whatever subscriber is global
        let span = tracing::dispatcher::with_default(&dispatch, || {
            info_span!("pipeline_run", run_id = %run_id)
        });
        self.execute()
            .instrument(span)
            .with_subscriber(dispatch)
            .await?;
        Ok(&self.run)
    }

    async fn execute(&mut self) -> Result<()> {
        let started = Instant::now();
        self.run.state = RunState::Running;
        info!("Starting data pipeline process");

        let plan = self.plan();
        self.emit_event(PipelineEvent::RunStarted {
            run_id: self.run.run_id,
            total_steps: plan.len() + 1,
        })
        .await;

        // Scoped acquisition: the reader is closed below on success and failure alike
        let step_started = Instant::now();
        self.emit_event(PipelineEvent::StepStarted {
            step: CONNECT_STEP.to_string(),
            step_index: 0,
        })
        .await;
        let source = match SourceReader::open(&self.config.db.path).await {
            Ok(source) => source,
            Err(e) => {
                let params = format!("db.path={}", self.config.db.path.display());
                return self
                    .fail(CONNECT_STEP, &params, e, step_started, started)
                    .await;
            }
        };
        self.record_success(CONNECT_STEP, 0, step_started).await;

        let result = self.run_plan(&source, &plan, started).await;
        source.close().await;

        match result {
            Ok(()) => {
                self.run.state = RunState::Completed;
                self.run.elapsed = started.elapsed();
                info!(
                    elapsed_ms = self.run.elapsed.as_millis() as u64,
                    "Finishing data pipeline process: {} reports written in {:.3}s",
                    plan.len(),
                    self.run.elapsed.as_secs_f64()
                );
                self.emit_event(PipelineEvent::RunCompleted {
                    elapsed_ms: self.run.elapsed.as_millis(),
                })
                .await;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn run_plan(
        &mut self,
        source: &SourceReader,
        plan: &[ResolvedReport],
        started: Instant,
    ) -> Result<()> {
        for (index, report) in plan.iter().enumerate() {
            let step = report.id.as_str();
            let params = self.describe_params(report);

            if let Some(deadline) = self.deadline {
                if Instant::now() >= deadline {
                    let e = Error::DeadlineExceeded(step.to_string());
                    return self.fail(step, &params, e, Instant::now(), started).await;
                }
            }

            let step_started = Instant::now();
            info!(step, %params, "Running report step");
            self.emit_event(PipelineEvent::StepStarted {
                step: step.to_string(),
                step_index: index + 1,
            })
            .await;

            match self.run_report(source, report).await {
                Ok(rows) => self.record_success(step, rows, step_started).await,
                Err(e) => return self.fail(step, &params, e, step_started, started).await,
            }
        }
        Ok(())
    }

    /// extract → aggregate → (rank) → write for one report; returns rows written
    async fn run_report(&self, source: &SourceReader, report: &ResolvedReport) -> Result<usize> {
        let strategy = strategy_for(report.strategy);
        let header = header_for(report.id);

        let rows = match report.id {
            ReportId::SalesByMonth => {
                aggregate::by_month(source, Filter::default(), strategy).await?
            }
            ReportId::SalesByQuarter => {
                aggregate::by_quarter(source, Filter::default(), strategy).await?
            }
            ReportId::SalesByYear => {
                let filter = Filter {
                    year: self.target_year(source).await?,
                    ..Filter::default()
                };
                aggregate::by_month(source, filter, strategy).await?
            }
            ReportId::SalesByGenre => {
                aggregate::by_genre(source, Filter::default(), strategy).await?
            }
            ReportId::TopArtists => {
                let all = aggregate::by_artist(source, Filter::default(), strategy).await?;
                rank::top_n(&all, self.config.top_n)?
            }
            ReportId::TracksByGenre => {
                let counts = aggregate::tracks_by_genre(source, strategy).await?;
                sink::write_table(&report.path, header, &counts)?;
                return Ok(counts.len());
            }
        };

        sink::write_table(&report.path, header, &rows)?;
        Ok(rows.len())
    }

    /// Configured year, else the latest invoice year in the store
    async fn target_year(&self, source: &SourceReader) -> Result<Option<i32>> {
        match self.config.year {
            Some(year) => Ok(Some(year)),
            None => {
                let year = source.latest_invoice_year().await?;
                debug!(?year, "No year configured, using latest invoice year");
                Ok(year)
            }
        }
    }

    fn describe_params(&self, report: &ResolvedReport) -> String {
        let mut params = format!(
            "path={}, strategy={}",
            report.path.display(),
            report.strategy
        );
        match report.id {
            ReportId::SalesByYear => match self.config.year {
                Some(year) => params.push_str(&format!(", year={}", year)),
                None => params.push_str(", year=latest"),
            },
            ReportId::TopArtists => params.push_str(&format!(", top_n={}", self.config.top_n)),
            _ => {}
        }
        params
    }

    async fn record_success(&mut self, step: &str, rows: usize, step_started: Instant) {
        let elapsed = step_started.elapsed();
        info!(
            step,
            rows,
            elapsed_ms = elapsed.as_millis() as u64,
            "Step completed"
        );
        self.run.steps.push(StepOutcome {
            name: step.to_string(),
            status: StepStatus::Succeeded { rows },
            elapsed,
        });
        self.emit_event(PipelineEvent::StepCompleted {
            step: step.to_string(),
            rows,
            elapsed_ms: elapsed.as_millis(),
        })
        .await;
    }

    /// Transition to `Failed`, log with context, and hand the error back
    async fn fail(
        &mut self,
        step: &str,
        params: &str,
        e: Error,
        step_started: Instant,
        run_started: Instant,
    ) -> Result<()> {
        let step_elapsed = step_started.elapsed();
        self.run.state = RunState::Failed;
        self.run.elapsed = run_started.elapsed();
        self.run.steps.push(StepOutcome {
            name: step.to_string(),
            status: StepStatus::Failed {
                error: e.to_string(),
            },
            elapsed: step_elapsed,
        });

        error!(
            step,
            %params,
            kind = e.kind(),
            step_elapsed_ms = step_elapsed.as_millis() as u64,
            run_elapsed_ms = self.run.elapsed.as_millis() as u64,
            "Pipeline step failed, aborting run: {}",
            e
        );
        self.emit_event(PipelineEvent::RunFailed {
            step: step.to_string(),
            error: e.to_string(),
            elapsed_ms: self.run.elapsed.as_millis(),
        })
        .await;

        Err(e)
    }

    async fn emit_event(&self, event: PipelineEvent) {
        if let Some(tx) = &self.event_tx {
            if tx.send(event).await.is_err() {
                debug!("Pipeline event receiver dropped");
            }
        }
    }
}
