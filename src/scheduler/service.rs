use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio::sync::Mutex;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::models::RunReport;
use crate::config::SchedulerConfig;
use crate::errors::AppError;
use crate::recurrence::RecurrenceRule;
use crate::store::Store;
use crate::transaction::models::Transaction;
use crate::transaction::{InstallmentPlan, TransactionService};

#[derive(Debug, Clone, Copy)]
enum Cohort {
    Recurring,
    Installment,
}

/// What happened to one due occurrence.
enum Step {
    Created,
    Skipped,
    Done,
}

/// Materializes recurring and installment occurrences up to a given day.
///
/// Each occurrence is written in its own atomic unit that first re-locks the
/// template, so two schedulers racing on the same store can never insert the
/// same occurrence twice. Runs of the same cohort never overlap.
pub struct RecurrenceScheduler {
    store: Arc<dyn Store>,
    config: SchedulerConfig,
    recurring_guard: Mutex<()>,
    installment_guard: Mutex<()>,
}

impl RecurrenceScheduler {
    pub fn new(store: Arc<dyn Store>, config: SchedulerConfig) -> Self {
        Self {
            store,
            config,
            recurring_guard: Mutex::new(()),
            installment_guard: Mutex::new(()),
        }
    }

    /// Tick forever at the configured interval, processing both cohorts with
    /// the current UTC date.
    pub async fn run(&self) {
        let mut ticker = time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The first tick completes immediately
        if !self.config.run_on_start {
            ticker.tick().await;
        }

        loop {
            ticker.tick().await;
            let today = Utc::now().date_naive();
            let recurring = self.process_recurring_transactions_on(today).await;
            let installments = self.process_installment_transactions_on(today).await;
            info!(%today, %recurring, %installments, "scheduler pass finished");
        }
    }

    pub async fn process_recurring_transactions(&self) -> RunReport {
        self.process_recurring_transactions_on(Utc::now().date_naive())
            .await
    }

    /// Generate every recurring occurrence due on or before `today`.
    pub async fn process_recurring_transactions_on(&self, today: NaiveDate) -> RunReport {
        let Ok(_guard) = self.recurring_guard.try_lock() else {
            debug!("recurring run already in progress, skipping");
            return RunReport::default();
        };

        let mut report = RunReport::default();
        let templates = match self.store.recurring_templates().await {
            Ok(templates) => templates,
            Err(e) => {
                warn!(error = %e, "failed to load recurring templates");
                report.failed += 1;
                return report;
            }
        };

        for template in templates {
            if let Err(e) = self
                .catch_up(Cohort::Recurring, &template, today, &mut report)
                .await
            {
                warn!(template_id = %template.id, error = %e, "recurring template failed");
                report.failed += 1;
            }
        }

        if !report.is_empty() {
            info!(%today, %report, "recurring transactions processed");
        }
        report
    }

    pub async fn process_installment_transactions(&self) -> RunReport {
        self.process_installment_transactions_on(Utc::now().date_naive())
            .await
    }

    /// Generate every installment due on or before `today`.
    pub async fn process_installment_transactions_on(&self, today: NaiveDate) -> RunReport {
        let Ok(_guard) = self.installment_guard.try_lock() else {
            debug!("installment run already in progress, skipping");
            return RunReport::default();
        };

        let mut report = RunReport::default();
        let templates = match self.store.installment_templates_in_progress().await {
            Ok(templates) => templates,
            Err(e) => {
                warn!(error = %e, "failed to load installment templates");
                report.failed += 1;
                return report;
            }
        };

        for template in templates {
            if let Err(e) = self
                .catch_up(Cohort::Installment, &template, today, &mut report)
                .await
            {
                warn!(template_id = %template.id, error = %e, "installment template failed");
                report.failed += 1;
            }
        }

        if !report.is_empty() {
            info!(%today, %report, "installment transactions processed");
        }
        report
    }

    /// Advance one template until nothing is due, bounded by
    /// `max_catch_up` occurrences per run.
    async fn catch_up(
        &self,
        cohort: Cohort,
        template: &Transaction,
        today: NaiveDate,
        report: &mut RunReport,
    ) -> Result<(), AppError> {
        for _ in 0..self.config.max_catch_up {
            let step = match cohort {
                Cohort::Recurring => {
                    self.recurring_step(template.id, template.user_id, today)
                        .await?
                }
                Cohort::Installment => {
                    self.installment_step(template.id, template.user_id, today)
                        .await?
                }
            };
            match step {
                Step::Created => report.created += 1,
                Step::Skipped => report.skipped += 1,
                Step::Done => return Ok(()),
            }
        }
        debug!(template_id = %template.id, "catch-up limit reached, continuing next run");
        Ok(())
    }

    /// Insert the next recurring occurrence if it is due.
    async fn recurring_step(
        &self,
        template_id: Uuid,
        user_id: Uuid,
        today: NaiveDate,
    ) -> Result<Step, AppError> {
        let mut unit = self.store.begin().await?;

        // Re-read under lock: the template may have changed since the batch query
        let Some(template) = unit.lock_transaction(template_id, user_id).await? else {
            return Ok(Step::Done);
        };
        let Some(rule) = template.recurrence_rule().filter(|_| template.recurring) else {
            return Ok(Step::Done);
        };

        let anchor = template.release_date;
        let last = unit
            .latest_occurrence_date(template_id)
            .await?
            .map_or(anchor, |latest| latest.max(anchor));
        let Some(next) = rule.next_occurrence(anchor, last) else {
            return Ok(Step::Done);
        };
        if next > today {
            return Ok(Step::Done);
        }

        if unit.occurrence_exists_on(template_id, next).await? {
            debug!(%template_id, date = %next, "recurring occurrence already exists");
            return Ok(Step::Done);
        }

        let occurrence =
            TransactionService::create_occurrence(unit.as_mut(), &template, next, None).await?;
        unit.commit().await?;

        debug!(
            %template_id,
            occurrence_id = %occurrence.id,
            date = %next,
            "recurring occurrence created"
        );
        Ok(Step::Created)
    }

    /// Insert the next installment of a series if it is due.
    async fn installment_step(
        &self,
        template_id: Uuid,
        user_id: Uuid,
        today: NaiveDate,
    ) -> Result<Step, AppError> {
        let mut unit = self.store.begin().await?;

        let Some(mut template) = unit.lock_transaction(template_id, user_id).await? else {
            return Ok(Step::Done);
        };
        let total_installments = match template.number_installments {
            Some(n) if n > 1 => n,
            _ => return Ok(Step::Done),
        };
        let next_index = template.current_installment.unwrap_or(1) + 1;
        if next_index > total_installments {
            return Ok(Step::Done);
        }

        let anchor = template.release_date;
        let Some(due) = RecurrenceRule::Monthly.nth_occurrence(anchor, (next_index - 1) as u32)
        else {
            return Ok(Step::Done);
        };
        if due > today {
            return Ok(Step::Done);
        }

        let step = if unit.installment_exists(template_id, next_index).await? {
            // The row is there but the counter lagged behind; catch it up
            Step::Skipped
        } else {
            let count = total_installments as u32;
            let plan = match template.value_installment {
                Some(base) => InstallmentPlan::from_stored(
                    template.value,
                    count,
                    base,
                    template.last_installment_value,
                ),
                None => InstallmentPlan::new(template.value, count)?,
            };
            let amount = plan.value_of(next_index as u32);
            TransactionService::create_occurrence(
                unit.as_mut(),
                &template,
                due,
                Some((next_index, amount)),
            )
            .await?;
            Step::Created
        };

        template.current_installment = Some(next_index);
        template.updated_at = Utc::now();
        unit.update_transaction(&template).await?;
        unit.commit().await?;

        debug!(%template_id, installment = next_index, date = %due, "installment processed");
        Ok(step)
    }
}
