//! Extraction of execution statistics from a MongoDB `explain` response
//!
//! The server reports the winning plan in more than one shape depending on its
//! version and query engine. The shapes recognised here are:
//!
//! - `{ stage: "FETCH", inputStage: { stage: "IXSCAN", ... } }` (stage on the plan)
//! - `{ inputStage: { stage: "COLLSCAN", ... } }` (stage one level down)
//!
//! Slot-based engine responses wrap either shape in a `queryPlan` document,
//! which is unwrapped before classification.

use mongodb::bson::{Bson, Document};

use crate::config::MISSING_LABEL;

/// The winning plan, classified by where its stage name lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WinningPlan {
    /// Stage named directly on the winning plan
    Direct { stage: String },
    /// Stage named on the winning plan's `inputStage`
    Nested { stage: String },
    /// No stage found in either place
    Unknown,
}

impl WinningPlan {
    pub fn from_plan(plan: &Document) -> Self {
        let plan = plan.get_document("queryPlan").unwrap_or(plan);

        if let Ok(stage) = plan.get_str("stage") {
            return WinningPlan::Direct {
                stage: stage.to_string(),
            };
        }

        match plan
            .get_document("inputStage")
            .ok()
            .and_then(|input| input.get_str("stage").ok())
        {
            Some(stage) => WinningPlan::Nested {
                stage: stage.to_string(),
            },
            None => WinningPlan::Unknown,
        }
    }

    /// Stage label for display, `N/A` when unknown
    pub fn label(&self) -> &str {
        match self {
            WinningPlan::Direct { stage } | WinningPlan::Nested { stage } => stage,
            WinningPlan::Unknown => MISSING_LABEL,
        }
    }
}

/// Summary of one query's execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplainStats {
    pub keys_examined: Option<i64>,
    pub docs_examined: Option<i64>,
    pub execution_time_ms: Option<i64>,
    pub winning_plan: WinningPlan,
    /// Leaf stage of the plan tree (IXSCAN, COLLSCAN, ...)
    pub access_path: Option<String>,
}

impl ExplainStats {
    /// Build stats from a raw explain response. Never fails: missing parts
    /// become `None` or [`WinningPlan::Unknown`].
    pub fn from_explain(explain: &Document) -> Self {
        let stats = explain.get_document("executionStats").ok();
        let plan = locate_winning_plan(explain);

        let winning_plan = match plan {
            Some(plan) => WinningPlan::from_plan(plan),
            None => WinningPlan::Unknown,
        };
        if winning_plan == WinningPlan::Unknown {
            tracing::warn!("Explain response has no recognisable winning plan stage");
        }

        Self {
            keys_examined: stats.and_then(|s| integer_field(s, "totalKeysExamined")),
            docs_examined: stats.and_then(|s| integer_field(s, "totalDocsExamined")),
            execution_time_ms: stats.and_then(|s| integer_field(s, "executionTimeMillis")),
            winning_plan,
            access_path: plan.and_then(leaf_stage),
        }
    }

    /// Whether the query was answered through an index
    pub fn used_index(&self) -> bool {
        self.access_path.as_deref() == Some("IXSCAN")
    }
}

fn locate_winning_plan(explain: &Document) -> Option<&Document> {
    explain
        .get_document("queryPlanner")
        .and_then(|planner| planner.get_document("winningPlan"))
        .or_else(|_| {
            explain
                .get_document("executionStats")
                .and_then(|stats| stats.get_document("winningPlan"))
        })
        .ok()
}

fn leaf_stage(plan: &Document) -> Option<String> {
    let mut current = plan.get_document("queryPlan").unwrap_or(plan);
    let mut stage = current.get_str("stage").ok();
    while let Ok(input) = current.get_document("inputStage") {
        current = input;
        if let Ok(inner) = current.get_str("stage") {
            stage = Some(inner);
        }
    }
    stage.map(str::to_string)
}

fn integer_field(doc: &Document, key: &str) -> Option<i64> {
    match doc.get(key)? {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        Bson::Double(n) => Some(*n as i64),
        _ => None,
    }
}
