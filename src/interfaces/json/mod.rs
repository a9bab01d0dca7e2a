//! JSON-lines command surface used by the CLI binary. Each input line is one
//! tagged [`Command`]; lookups print their result as JSON.

pub mod command_reader;

pub use command_reader::CommandReader;

use crate::application::service::TrackingService;
use crate::domain::payment::{CryptoDestination, FiatPlatform};
use crate::domain::receipt::EvidenceFile;
use crate::domain::shipment::NewShipment;
use crate::domain::stage::{NewStage, PaymentStatus, StagePatch, StatusOverride};
use crate::error::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::PathBuf;

/// One replayable operation against the tracking core.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    CreateShipment {
        #[serde(flatten)]
        shipment: NewShipment,
    },
    CreateStage {
        admin_id: u64,
        #[serde(flatten)]
        stage: NewStage,
    },
    UpdateStage {
        admin_id: u64,
        stage_id: u64,
        #[serde(flatten)]
        patch: StagePatch,
    },
    DeleteStage {
        admin_id: u64,
        stage_id: u64,
    },
    /// Evidence bytes come from a referenced file; JSON lines cannot carry
    /// binary payloads.
    SubmitReceipt {
        stage_id: u64,
        content_type: String,
        evidence_path: PathBuf,
    },
    ApprovePayment {
        admin_id: u64,
        stage_id: u64,
        amount_paid: Decimal,
        payment_date: NaiveDate,
    },
    RejectPayment {
        admin_id: u64,
        stage_id: u64,
        reason: String,
    },
    SetPaymentStatus {
        admin_id: u64,
        stage_id: u64,
        target: PaymentStatus,
        #[serde(flatten)]
        extra: StatusOverride,
    },
    Track {
        tracking_code: String,
    },
    InitiatePayment {
        stage_id: u64,
    },
}

/// Admin-configured payment destinations, loaded once at startup.
#[derive(Debug, Deserialize, Default)]
pub struct DirectoryConfig {
    #[serde(default)]
    pub crypto: Vec<CryptoDestination>,
    #[serde(default)]
    pub fiat: Vec<FiatPlatform>,
}

/// Runs one command against the service and renders the outcome as JSON.
pub async fn execute(service: &TrackingService, command: Command) -> Result<Value> {
    match command {
        Command::CreateShipment { shipment } => {
            let shipment = service.create_shipment(shipment).await?;
            Ok(json!({
                "op": "create_shipment",
                "shipment_id": shipment.id,
                "tracking_code": shipment.tracking_code,
            }))
        }
        Command::CreateStage { admin_id, stage } => {
            let stage = service.create_stage(admin_id, stage).await?;
            Ok(json!({
                "op": "create_stage",
                "stage_id": stage.id,
                "payment_status": stage.payment_status(),
            }))
        }
        Command::UpdateStage {
            admin_id,
            stage_id,
            patch,
        } => {
            let stage = service.update_stage(admin_id, stage_id, patch).await?;
            Ok(json!({ "op": "update_stage", "stage_id": stage.id }))
        }
        Command::DeleteStage { admin_id, stage_id } => {
            service.delete_stage(admin_id, stage_id).await?;
            Ok(json!({ "op": "delete_stage", "stage_id": stage_id }))
        }
        Command::SubmitReceipt {
            stage_id,
            content_type,
            evidence_path,
        } => {
            let bytes = tokio::fs::read(&evidence_path).await?;
            let stage = service
                .submit_receipt(stage_id, EvidenceFile { content_type, bytes })
                .await?;
            Ok(json!({
                "op": "submit_receipt",
                "stage_id": stage.id,
                "payment_status": stage.payment_status(),
                "receipt_count": stage.receipts().len(),
            }))
        }
        Command::ApprovePayment {
            admin_id,
            stage_id,
            amount_paid,
            payment_date,
        } => {
            let stage = service
                .approve_payment(admin_id, stage_id, amount_paid, payment_date)
                .await?;
            Ok(json!({
                "op": "approve_payment",
                "stage_id": stage.id,
                "payment_status": stage.payment_status(),
            }))
        }
        Command::RejectPayment {
            admin_id,
            stage_id,
            reason,
        } => {
            let stage = service.reject_payment(admin_id, stage_id, &reason).await?;
            Ok(json!({
                "op": "reject_payment",
                "stage_id": stage.id,
                "payment_status": stage.payment_status(),
                "reason": reason,
            }))
        }
        Command::SetPaymentStatus {
            admin_id,
            stage_id,
            target,
            extra,
        } => {
            let stage = service
                .set_payment_status(admin_id, stage_id, target, extra)
                .await?;
            Ok(json!({
                "op": "set_payment_status",
                "stage_id": stage.id,
                "payment_status": stage.payment_status(),
            }))
        }
        Command::Track { tracking_code } => {
            let (summary, projection) = service.track_shipment(&tracking_code).await?;
            Ok(json!({
                "op": "track",
                "shipment": summary,
                "projection": projection,
            }))
        }
        Command::InitiatePayment { stage_id } => {
            let options = service.initiate_payment(stage_id).await?;
            Ok(json!({ "op": "initiate_payment", "options": options }))
        }
    }
}
