use super::stage::{FeeAmount, PaymentStatus, Stage};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// What a tracker (or an admin dashboard) sees of one stage. Carries the
/// payment metadata but never the receipt bytes themselves.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct StageView {
    pub id: u64,
    pub title: String,
    pub carrier_note: String,
    pub occurred_at: DateTime<Utc>,
    pub requires_fee: bool,
    pub payment_status: PaymentStatus,
    pub fee_amount: Option<FeeAmount>,
    pub percentage_note: Option<String>,
    pub amount_paid: Option<FeeAmount>,
    pub payment_date: Option<NaiveDate>,
    pub receipt_count: usize,
}

impl From<&Stage> for StageView {
    fn from(stage: &Stage) -> Self {
        Self {
            id: stage.id,
            title: stage.title.clone(),
            carrier_note: stage.carrier_note.clone(),
            occurred_at: stage.occurred_at,
            requires_fee: stage.requires_fee(),
            payment_status: stage.payment_status(),
            fee_amount: stage.fee_amount(),
            percentage_note: stage.percentage_note().map(str::to_string),
            amount_paid: stage.amount_paid(),
            payment_date: stage.payment_date(),
            receipt_count: stage.receipts().len(),
        }
    }
}

/// The receiver-facing partition of a shipment's stage list: everything
/// before the current stage is complete, everything after it stays hidden.
#[derive(Debug, Serialize, PartialEq, Clone, Default)]
pub struct TrackingProjection {
    pub completed: Vec<StageView>,
    pub current: Option<StageView>,
}

/// Derives the receiver-facing projection from the full stage list, already
/// ordered ascending by `occurred_at` (ties by id).
///
/// The current stage is the first unresolved one (fee required and not yet
/// paid); when every stage is resolved, the last stage is shown as current.
/// Stages after the current one are omitted entirely. This is the single
/// place the rule lives; admin and tracker views both consume it.
pub fn project(stages: &[Stage]) -> TrackingProjection {
    let Some(last) = stages.len().checked_sub(1) else {
        return TrackingProjection::default();
    };

    let current_idx = stages
        .iter()
        .position(Stage::is_unresolved)
        .unwrap_or(last);

    TrackingProjection {
        completed: stages[..current_idx].iter().map(StageView::from).collect(),
        current: Some(StageView::from(&stages[current_idx])),
    }
}
