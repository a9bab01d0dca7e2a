use crate::error::{Result, TrackError};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a positive monetary fee.
///
/// This is a wrapper around `rust_decimal::Decimal` that guarantees the
/// amount is strictly positive, so downstream code never re-validates.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct FeeAmount(Decimal);

impl FeeAmount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(TrackError::ValidationError(
                "amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for FeeAmount {
    type Error = TrackError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl fmt::Display for FeeAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Payment lifecycle of a single stage.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    NoPaymentRequired,
    Unpaid,
    Pending,
    Paid,
}

impl PaymentStatus {
    /// The direct-override transition table. Self-transitions and anything
    /// not listed here are invalid.
    pub fn can_transition_to(self, to: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, to),
            (NoPaymentRequired, Unpaid)
                | (Unpaid, NoPaymentRequired)
                | (Unpaid, Pending)
                | (Unpaid, Paid)
                | (Pending, Unpaid)
                | (Pending, Paid)
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoPaymentRequired => "no_payment_required",
            Self::Unpaid => "unpaid",
            Self::Pending => "pending",
            Self::Paid => "paid",
        };
        f.write_str(name)
    }
}

/// Payment evidence submitted by a tracker. Append-only on the stage.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Receipt {
    pub content_type: String,
    pub bytes: Vec<u8>,
    pub submitted_at: DateTime<Utc>,
}

/// Carrier-provided document attached to a stage, independent of receipts.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Document {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Fields an admin supplies when creating a stage.
#[derive(Debug, Deserialize, Clone)]
pub struct NewStage {
    pub shipment_id: u64,
    pub title: String,
    #[serde(default)]
    pub carrier_note: String,
    pub occurred_at: DateTime<Utc>,
    pub requires_fee: bool,
    #[serde(default)]
    pub fee_amount: Option<Decimal>,
    #[serde(default)]
    pub percentage_note: Option<String>,
}

/// Partial update an admin may apply to an existing stage.
///
/// Payment status is deliberately absent: status only changes through the
/// transition operations on [`Stage`].
#[derive(Debug, Deserialize, Clone, Default)]
pub struct StagePatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub carrier_note: Option<String>,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub requires_fee: Option<bool>,
    #[serde(default)]
    pub fee_amount: Option<Decimal>,
    #[serde(default)]
    pub percentage_note: Option<String>,
    #[serde(default)]
    pub supporting_document: Option<Document>,
}

/// Extra fields for a direct status override; only some targets need them.
#[derive(Debug, Deserialize, Clone, Copy, Default)]
pub struct StatusOverride {
    #[serde(default)]
    pub amount_paid: Option<Decimal>,
    #[serde(default)]
    pub payment_date: Option<NaiveDate>,
    #[serde(default)]
    pub fee_amount: Option<Decimal>,
}

/// One step in a shipment's journey, optionally gated by a payment.
///
/// Every payment-relevant field is private: the only mutation paths are the
/// transition methods below, which validate fully before writing anything.
/// A failed call leaves the stage exactly as it was.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Stage {
    /// Store-assigned, monotonically increasing. Doubles as the tie-break
    /// for stages sharing an `occurred_at`.
    pub id: u64,
    pub shipment_id: u64,
    pub title: String,
    pub carrier_note: String,
    pub occurred_at: DateTime<Utc>,
    requires_fee: bool,
    payment_status: PaymentStatus,
    fee_amount: Option<FeeAmount>,
    percentage_note: Option<String>,
    receipts: Vec<Receipt>,
    amount_paid: Option<FeeAmount>,
    payment_date: Option<NaiveDate>,
    supporting_document: Option<Document>,
}

impl Stage {
    /// Builds a stage from admin input. The id is assigned later by the
    /// store. Initial status is `Unpaid` when a fee is required, otherwise
    /// `NoPaymentRequired`.
    pub fn new(draft: NewStage) -> Result<Self> {
        let (fee_amount, percentage_note, status) = if draft.requires_fee {
            let fee = draft
                .fee_amount
                .ok_or_else(|| {
                    TrackError::ValidationError(
                        "fee_amount is required when the stage requires a fee".to_string(),
                    )
                })?
                .try_into()?;
            (Some(fee), draft.percentage_note, PaymentStatus::Unpaid)
        } else {
            // Invariant: a stage without a fee carries no payment
            // bookkeeping. Conflicting input is rejected, not dropped.
            if draft.fee_amount.is_some() {
                return Err(TrackError::ValidationError(
                    "cannot set a fee on a stage that requires no payment".to_string(),
                ));
            }
            if draft.percentage_note.is_some() {
                return Err(TrackError::ValidationError(
                    "percentage note only applies to fee-bearing stages".to_string(),
                ));
            }
            (None, None, PaymentStatus::NoPaymentRequired)
        };

        Ok(Self {
            id: 0,
            shipment_id: draft.shipment_id,
            title: draft.title,
            carrier_note: draft.carrier_note,
            occurred_at: draft.occurred_at,
            requires_fee: draft.requires_fee,
            payment_status: status,
            fee_amount,
            percentage_note,
            receipts: Vec::new(),
            amount_paid: None,
            payment_date: None,
            supporting_document: None,
        })
    }

    pub fn requires_fee(&self) -> bool {
        self.requires_fee
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn fee_amount(&self) -> Option<FeeAmount> {
        self.fee_amount
    }

    pub fn percentage_note(&self) -> Option<&str> {
        self.percentage_note.as_deref()
    }

    pub fn receipts(&self) -> &[Receipt] {
        &self.receipts
    }

    pub fn amount_paid(&self) -> Option<FeeAmount> {
        self.amount_paid
    }

    pub fn payment_date(&self) -> Option<NaiveDate> {
        self.payment_date
    }

    pub fn supporting_document(&self) -> Option<&Document> {
        self.supporting_document.as_ref()
    }

    /// A stage blocks shipment progression until its fee is settled.
    pub fn is_unresolved(&self) -> bool {
        self.requires_fee && self.payment_status != PaymentStatus::Paid
    }

    /// Appends payment evidence and moves the stage to `Pending`.
    /// Allowed only from `Unpaid` or `Pending`.
    pub fn submit_receipt(&mut self, receipt: Receipt) -> Result<()> {
        match self.payment_status {
            PaymentStatus::Unpaid | PaymentStatus::Pending => {
                self.receipts.push(receipt);
                self.payment_status = PaymentStatus::Pending;
                Ok(())
            }
            from => Err(TrackError::InvalidTransition {
                from,
                to: PaymentStatus::Pending,
            }),
        }
    }

    /// Marks the fee as settled. Allowed from `Pending`, or from `Unpaid`
    /// as an administrative override.
    pub fn approve_payment(&mut self, amount_paid: FeeAmount, payment_date: NaiveDate) -> Result<()> {
        match self.payment_status {
            PaymentStatus::Pending | PaymentStatus::Unpaid => {
                self.amount_paid = Some(amount_paid);
                self.payment_date = Some(payment_date);
                self.payment_status = PaymentStatus::Paid;
                Ok(())
            }
            from => Err(TrackError::InvalidTransition {
                from,
                to: PaymentStatus::Paid,
            }),
        }
    }

    /// Sends a pending payment back to `Unpaid`. Already-submitted receipts
    /// stay on the stage as an audit trail.
    pub fn reject_payment(&mut self) -> Result<()> {
        match self.payment_status {
            PaymentStatus::Pending => {
                self.payment_status = PaymentStatus::Unpaid;
                Ok(())
            }
            from => Err(TrackError::InvalidTransition {
                from,
                to: PaymentStatus::Unpaid,
            }),
        }
    }

    /// Administrative direct override, constrained by the transition table.
    ///
    /// Entering `NoPaymentRequired` clears all payment bookkeeping; entering
    /// `Paid` requires an amount and date; leaving `NoPaymentRequired`
    /// requires a fee amount. All requirements are checked before any field
    /// is written.
    pub fn set_payment_status(&mut self, to: PaymentStatus, extra: StatusOverride) -> Result<()> {
        let from = self.payment_status;
        if !from.can_transition_to(to) {
            return Err(TrackError::InvalidTransition { from, to });
        }

        match to {
            PaymentStatus::NoPaymentRequired => {
                if !self.receipts.is_empty() {
                    return Err(TrackError::ValidationError(
                        "cannot waive the fee once receipts have been submitted".to_string(),
                    ));
                }
                self.requires_fee = false;
                self.fee_amount = None;
                self.amount_paid = None;
                self.payment_date = None;
                self.percentage_note = None;
            }
            PaymentStatus::Unpaid => {
                if from == PaymentStatus::NoPaymentRequired {
                    let fee = extra
                        .fee_amount
                        .ok_or_else(|| {
                            TrackError::ValidationError(
                                "fee_amount is required to make a stage payable".to_string(),
                            )
                        })?
                        .try_into()?;
                    self.requires_fee = true;
                    self.fee_amount = Some(fee);
                }
            }
            PaymentStatus::Pending => {}
            PaymentStatus::Paid => {
                let amount: FeeAmount = extra
                    .amount_paid
                    .ok_or_else(|| {
                        TrackError::ValidationError(
                            "amount_paid is required to mark a stage paid".to_string(),
                        )
                    })?
                    .try_into()?;
                let date = extra.payment_date.ok_or_else(|| {
                    TrackError::ValidationError(
                        "payment_date is required to mark a stage paid".to_string(),
                    )
                })?;
                self.amount_paid = Some(amount);
                self.payment_date = Some(date);
            }
        }

        self.payment_status = to;
        Ok(())
    }

    /// Applies a partial admin update. Toggling `requires_fee` is routed
    /// through the transition table so the state machine stays the single
    /// mutation path; it is rejected outright once receipts exist.
    pub fn apply_patch(&mut self, patch: StagePatch) -> Result<()> {
        // Everything fallible is checked up front; mutation starts only
        // once the whole patch is known to be valid.
        let fee_toggle = match patch.requires_fee {
            Some(requires_fee) if requires_fee != self.requires_fee => {
                if !self.receipts.is_empty() {
                    return Err(TrackError::ValidationError(
                        "requires_fee is immutable once receipts exist".to_string(),
                    ));
                }
                if requires_fee {
                    Some(PaymentStatus::Unpaid)
                } else {
                    Some(PaymentStatus::NoPaymentRequired)
                }
            }
            _ => None,
        };
        if fee_toggle == Some(PaymentStatus::Unpaid) {
            // Becoming payable needs a positive fee; the override below
            // enforces the same, but checking here keeps the patch atomic.
            patch
                .fee_amount
                .ok_or_else(|| {
                    TrackError::ValidationError(
                        "fee_amount is required to make a stage payable".to_string(),
                    )
                })?
                .try_into()
                .map(|_: FeeAmount| ())?;
        }
        let new_fee = match patch.fee_amount {
            Some(fee) if fee_toggle.is_none() => {
                if !self.requires_fee {
                    return Err(TrackError::ValidationError(
                        "cannot set a fee on a stage that requires no payment".to_string(),
                    ));
                }
                Some(fee.try_into()?)
            }
            _ => None,
        };
        if patch.percentage_note.is_some() {
            let payable_after = match fee_toggle {
                Some(PaymentStatus::Unpaid) => true,
                Some(_) => false,
                None => self.requires_fee,
            };
            if !payable_after {
                return Err(TrackError::ValidationError(
                    "percentage note only applies to fee-bearing stages".to_string(),
                ));
            }
        }

        if let Some(target) = fee_toggle {
            self.set_payment_status(
                target,
                StatusOverride {
                    fee_amount: patch.fee_amount,
                    ..Default::default()
                },
            )?;
        } else if let Some(fee) = new_fee {
            self.fee_amount = Some(fee);
        }
        if let Some(note) = patch.percentage_note {
            self.percentage_note = Some(note);
        }

        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(note) = patch.carrier_note {
            self.carrier_note = note;
        }
        if let Some(occurred_at) = patch.occurred_at {
            self.occurred_at = occurred_at;
        }
        if let Some(doc) = patch.supporting_document {
            self.supporting_document = Some(doc);
        }
        Ok(())
    }

    /// Checks the stage's field invariants. Used by tests to assert that no
    /// operation sequence can corrupt a stage.
    pub fn is_consistent(&self) -> bool {
        match self.payment_status {
            PaymentStatus::NoPaymentRequired => {
                !self.requires_fee
                    && self.fee_amount.is_none()
                    && self.amount_paid.is_none()
                    && self.payment_date.is_none()
                    && self.percentage_note.is_none()
                    && self.receipts.is_empty()
            }
            PaymentStatus::Paid => {
                self.requires_fee && self.amount_paid.is_some() && self.payment_date.is_some()
            }
            PaymentStatus::Unpaid | PaymentStatus::Pending => {
                self.requires_fee && self.fee_amount.is_some()
            }
        }
    }
}
