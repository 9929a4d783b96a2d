//! What happened to each relation in one run, for the terminal or as JSON.

use std::fmt::Write as _;

use opskit_core::{Drift, EnsureReport, Outcome, ReconcileError, ReconciliationPlan};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RelationResult {
    /// `ensure` ran to completion.
    Ensured(EnsureReport),
    /// Dry run: the plan that `ensure` would apply.
    Planned {
        relation: String,
        creates_relation: bool,
        statements: Vec<String>,
        drift: Vec<Drift>,
    },
    Failed {
        relation: String,
        error: String,
        recoverable: bool,
    },
}

impl RelationResult {
    pub fn planned(relation: &str, plan: &ReconciliationPlan) -> Self {
        RelationResult::Planned {
            relation: relation.to_string(),
            creates_relation: plan.creates_relation(),
            statements: plan.statements(),
            drift: plan.drift().to_vec(),
        }
    }

    pub fn failed(relation: &str, error: &ReconcileError) -> Self {
        RelationResult::Failed {
            relation: relation.to_string(),
            error: error.to_string(),
            recoverable: error.is_recoverable(),
        }
    }

    pub fn relation(&self) -> &str {
        match self {
            RelationResult::Ensured(report) => &report.relation,
            RelationResult::Planned { relation, .. } | RelationResult::Failed { relation, .. } => {
                relation
            }
        }
    }

    pub fn drift(&self) -> &[Drift] {
        match self {
            RelationResult::Ensured(report) => &report.drift,
            RelationResult::Planned { drift, .. } => drift,
            RelationResult::Failed { .. } => &[],
        }
    }

    pub fn applied_total(&self) -> usize {
        match self {
            RelationResult::Ensured(report) => report.applied().total(),
            _ => 0,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, RelationResult::Failed { .. })
    }
}

/// Results for every relation of one run, in the order they were processed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub dry_run: bool,
    pub results: Vec<RelationResult>,
}

impl RunSummary {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            results: Vec::new(),
        }
    }

    pub fn push(&mut self, result: RelationResult) {
        self.results.push(result);
    }

    pub fn applied_total(&self) -> usize {
        self.results.iter().map(RelationResult::applied_total).sum()
    }

    pub fn drift_count(&self) -> usize {
        self.results.iter().map(|r| r.drift().len()).sum()
    }

    pub fn failure_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_failure()).count()
    }

    pub fn is_success(&self) -> bool {
        self.failure_count() == 0
    }

    /// Relations whose outcome matches `pred`, by name.
    pub fn relations_where(&self, pred: impl Fn(&Outcome) -> bool) -> Vec<String> {
        self.results
            .iter()
            .filter_map(|r| match r {
                RelationResult::Ensured(report) if pred(&report.outcome) => {
                    Some(report.relation.clone())
                }
                _ => None,
            })
            .collect()
    }

    pub fn failed_relations(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| r.is_failure())
            .map(|r| r.relation().to_string())
            .collect()
    }

    /// Human-readable report, one tagged line per relation followed by its
    /// drift warnings, then a totals line.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for result in &self.results {
            render_result(&mut out, result);
            for drift in result.drift() {
                let _ = writeln!(out, "[DRIFT] {}: {}", result.relation(), drift);
            }
        }

        let _ = writeln!(
            out,
            "{} relation(s): {} change(s){}, {} drift, {} error(s)",
            self.results.len(),
            self.applied_total(),
            if self.dry_run { " (dry run)" } else { "" },
            self.drift_count(),
            self.failure_count(),
        );
        out
    }
}

fn render_result(out: &mut String, result: &RelationResult) {
    let relation = result.relation();
    let _ = match result {
        RelationResult::Ensured(report) => match report.outcome {
            Outcome::AlreadySatisfied => writeln!(out, "[OK] {}", relation),
            Outcome::Migrated(count) => writeln!(
                out,
                "[MIGRATED] {}: {} column(s), {} index(es) added",
                relation, count.columns_added, count.indexes_created
            ),
            Outcome::Created(count) => writeln!(
                out,
                "[CREATED] {}: relation and {} index(es)",
                relation, count.indexes_created
            ),
        },
        RelationResult::Planned { statements, .. } if statements.is_empty() => {
            writeln!(out, "[OK] {}", relation)
        }
        RelationResult::Planned {
            statements,
            creates_relation,
            ..
        } => {
            let _ = writeln!(
                out,
                "[PLAN] {}: {} statement(s){}",
                relation,
                statements.len(),
                if *creates_relation { ", creates relation" } else { "" }
            );
            for statement in statements {
                for line in statement.lines() {
                    let _ = writeln!(out, "    {}", line);
                }
            }
            Ok(())
        }
        RelationResult::Failed { error, .. } => writeln!(out, "[ERROR] {}: {}", relation, error),
    };
}
