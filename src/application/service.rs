use crate::domain::payment::{self, PaymentOptions};
use crate::domain::ports::{
    Notification, NotifierBox, PaymentDirectoryBox, ShipmentStoreBox, StageStoreBox,
};
use crate::domain::receipt::EvidenceFile;
use crate::domain::shipment::{NewShipment, Shipment, ShipmentSummary};
use crate::domain::stage::{NewStage, PaymentStatus, Stage, StagePatch, StatusOverride};
use crate::domain::visibility::{self, StageView, TrackingProjection};
use crate::error::{Result, TrackError};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

/// The main entry point for the tracking core.
///
/// `TrackingService` owns the storage and collaborator ports and exposes
/// every operation of the system. Admin operations take the authenticated
/// caller's id and check shipment ownership before touching anything;
/// tracker operations are unauthenticated and redact internal error detail.
pub struct TrackingService {
    shipments: ShipmentStoreBox,
    stages: StageStoreBox,
    directory: PaymentDirectoryBox,
    notifier: NotifierBox,
}

impl TrackingService {
    pub fn new(
        shipments: ShipmentStoreBox,
        stages: StageStoreBox,
        directory: PaymentDirectoryBox,
        notifier: NotifierBox,
    ) -> Self {
        Self {
            shipments,
            stages,
            directory,
            notifier,
        }
    }

    /// Registers a shipment. The store assigns the id and rejects duplicate
    /// tracking codes.
    pub async fn create_shipment(&self, draft: NewShipment) -> Result<Shipment> {
        if draft.tracking_code.trim().is_empty() {
            return Err(TrackError::ValidationError(
                "tracking_code must not be empty".to_string(),
            ));
        }
        let shipment = self
            .shipments
            .insert(Shipment {
                id: 0,
                admin_id: draft.admin_id,
                admin_email: draft.admin_email,
                tracking_code: draft.tracking_code,
                description: draft.description,
            })
            .await?;
        info!(shipment_id = shipment.id, code = %shipment.tracking_code, "shipment created");
        Ok(shipment)
    }

    /// Creates a stage against an owned shipment. Initial payment status is
    /// decided by the state machine from `requires_fee`.
    pub async fn create_stage(&self, admin_id: u64, draft: NewStage) -> Result<Stage> {
        self.authorize(admin_id, draft.shipment_id).await?;
        let stage = self.stages.insert(Stage::new(draft)?).await?;
        info!(
            stage_id = stage.id,
            shipment_id = stage.shipment_id,
            status = %stage.payment_status(),
            "stage created"
        );
        Ok(stage)
    }

    /// Partial field update. Payment status is not patchable here; it only
    /// moves through the transition operations below.
    pub async fn update_stage(
        &self,
        admin_id: u64,
        stage_id: u64,
        patch: StagePatch,
    ) -> Result<Stage> {
        self.authorize_stage(admin_id, stage_id).await?;
        let stage = self
            .stages
            .update(stage_id, Box::new(move |stage| stage.apply_patch(patch)))
            .await?;
        debug!(stage_id, "stage updated");
        Ok(stage)
    }

    /// Deletes a stage together with its receipts.
    pub async fn delete_stage(&self, admin_id: u64, stage_id: u64) -> Result<()> {
        self.authorize_stage(admin_id, stage_id).await?;
        self.stages.remove(stage_id).await?;
        info!(stage_id, "stage deleted");
        Ok(())
    }

    /// Tracker-submitted payment evidence: validate, append, and transition
    /// to `Pending` as one atomic store update. On failure the stage (and
    /// its receipt list) is untouched. The owning admin is notified on
    /// success; a delivery failure is logged, never surfaced.
    pub async fn submit_receipt(&self, stage_id: u64, evidence: EvidenceFile) -> Result<Stage> {
        let receipt = evidence.into_receipt()?;
        let stage = self
            .stages
            .update(stage_id, Box::new(move |stage| stage.submit_receipt(receipt)))
            .await?;
        info!(
            stage_id,
            receipts = stage.receipts().len(),
            "receipt submitted, payment pending"
        );

        if let Some(shipment) = self.shipments.get(stage.shipment_id).await? {
            let event = Notification::ReceiptSubmitted {
                stage_id: stage.id,
                stage_title: stage.title.clone(),
            };
            if let Err(e) = self.notifier.notify(&shipment.admin_email, event).await {
                warn!(stage_id, error = %e, "receipt notification failed");
            }
        }
        Ok(stage)
    }

    /// Confirms a pending (or, as an override, unpaid) payment.
    pub async fn approve_payment(
        &self,
        admin_id: u64,
        stage_id: u64,
        amount_paid: Decimal,
        payment_date: NaiveDate,
    ) -> Result<Stage> {
        self.authorize_stage(admin_id, stage_id).await?;
        let amount = amount_paid.try_into()?;
        let stage = self
            .stages
            .update(
                stage_id,
                Box::new(move |stage| stage.approve_payment(amount, payment_date)),
            )
            .await?;
        info!(stage_id, amount = %amount_paid, "payment approved");
        Ok(stage)
    }

    /// Sends a pending payment back to `Unpaid`. The reason reaches the
    /// submitter through the caller's response; it is never stored on the
    /// stage.
    pub async fn reject_payment(
        &self,
        admin_id: u64,
        stage_id: u64,
        reason: &str,
    ) -> Result<Stage> {
        self.authorize_stage(admin_id, stage_id).await?;
        let stage = self
            .stages
            .update(stage_id, Box::new(|stage| stage.reject_payment()))
            .await?;
        info!(stage_id, reason, "payment rejected");
        Ok(stage)
    }

    /// Administrative direct override, constrained by the transition table.
    pub async fn set_payment_status(
        &self,
        admin_id: u64,
        stage_id: u64,
        target: PaymentStatus,
        extra: StatusOverride,
    ) -> Result<Stage> {
        self.authorize_stage(admin_id, stage_id).await?;
        let stage = self
            .stages
            .update(
                stage_id,
                Box::new(move |stage| stage.set_payment_status(target, extra)),
            )
            .await?;
        info!(stage_id, status = %target, "payment status overridden");
        Ok(stage)
    }

    /// Public tracking lookup. Returns the shipment summary and the
    /// visibility-filtered stage projection; every internal failure
    /// collapses to `NotFound`.
    pub async fn track_shipment(
        &self,
        tracking_code: &str,
    ) -> Result<(ShipmentSummary, TrackingProjection)> {
        self.track_shipment_inner(tracking_code)
            .await
            .map_err(|e| e.redacted("shipment"))
    }

    async fn track_shipment_inner(
        &self,
        tracking_code: &str,
    ) -> Result<(ShipmentSummary, TrackingProjection)> {
        let shipment = self
            .shipments
            .find_by_tracking_code(tracking_code)
            .await?
            .ok_or(TrackError::NotFound("shipment"))?;
        let stages = self.stages.for_shipment(shipment.id).await?;
        debug!(shipment_id = shipment.id, stages = stages.len(), "tracking lookup");
        Ok((ShipmentSummary::from(&shipment), visibility::project(&stages)))
    }

    /// Public payment initiation: fee, crypto destinations, and substituted
    /// fiat redirects for an unpaid fee-bearing stage.
    pub async fn initiate_payment(&self, stage_id: u64) -> Result<PaymentOptions> {
        self.initiate_payment_inner(stage_id)
            .await
            .map_err(|e| e.redacted("stage"))
    }

    async fn initiate_payment_inner(&self, stage_id: u64) -> Result<PaymentOptions> {
        let stage = self
            .stages
            .get(stage_id)
            .await?
            .ok_or(TrackError::NotFound("stage"))?;
        let crypto = self.directory.crypto_destinations().await?;
        let platforms = self.directory.fiat_platforms().await?;
        payment::payment_options(&stage, crypto, &platforms)
    }

    /// Admin dashboard view: the full stage list alongside the same
    /// projection trackers see, derived by the one shared rule.
    pub async fn admin_overview(
        &self,
        admin_id: u64,
        shipment_id: u64,
    ) -> Result<(Vec<StageView>, TrackingProjection)> {
        self.authorize(admin_id, shipment_id).await?;
        let stages = self.stages.for_shipment(shipment_id).await?;
        let all = stages.iter().map(StageView::from).collect();
        Ok((all, visibility::project(&stages)))
    }

    async fn authorize(&self, admin_id: u64, shipment_id: u64) -> Result<Shipment> {
        let shipment = self
            .shipments
            .get(shipment_id)
            .await?
            .ok_or(TrackError::NotFound("shipment"))?;
        if shipment.admin_id != admin_id {
            return Err(TrackError::Unauthorized);
        }
        Ok(shipment)
    }

    async fn authorize_stage(&self, admin_id: u64, stage_id: u64) -> Result<(Shipment, Stage)> {
        let stage = self
            .stages
            .get(stage_id)
            .await?
            .ok_or(TrackError::NotFound("stage"))?;
        let shipment = self.authorize(admin_id, stage.shipment_id).await?;
        Ok((shipment, stage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::{CryptoDestination, FiatPlatform};
    use crate::domain::ports::Notifier;
    use crate::infrastructure::in_memory::{
        InMemoryDirectory, InMemoryShipmentStore, InMemoryStageStore,
    };
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Default, Clone)]
    struct RecordingNotifier {
        sent: Arc<Mutex<Vec<(String, Notification)>>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, admin_email: &str, event: Notification) -> Result<()> {
            self.sent.lock().await.push((admin_email.to_string(), event));
            Ok(())
        }
    }

    fn evidence() -> EvidenceFile {
        EvidenceFile {
            content_type: "image/png".to_string(),
            bytes: vec![1, 2, 3],
        }
    }

    fn service_with_notifier() -> (TrackingService, RecordingNotifier) {
        let notifier = RecordingNotifier::default();
        let directory = InMemoryDirectory::new(
            vec![CryptoDestination {
                currency: "BTC".to_string(),
                address: "bc1qtest".to_string(),
                label: None,
            }],
            vec![FiatPlatform {
                name: "cashapp".to_string(),
                base_url: "https://cash.example/pay".to_string(),
                message_template: "Paying {amount} for status {statusId}".to_string(),
            }],
        );
        let service = TrackingService::new(
            Box::new(InMemoryShipmentStore::new()),
            Box::new(InMemoryStageStore::new()),
            Box::new(directory),
            Box::new(notifier.clone()),
        );
        (service, notifier)
    }

    fn service() -> TrackingService {
        service_with_notifier().0
    }

    async fn shipment(service: &TrackingService, admin_id: u64, code: &str) -> Shipment {
        service
            .create_shipment(NewShipment {
                admin_id,
                admin_email: "admin@example.com".to_string(),
                tracking_code: code.to_string(),
                description: "container".to_string(),
            })
            .await
            .unwrap()
    }

    fn draft(shipment_id: u64, requires_fee: bool, fee: Option<Decimal>) -> NewStage {
        NewStage {
            shipment_id,
            title: "Customs clearance".to_string(),
            carrier_note: String::new(),
            occurred_at: Utc::now(),
            requires_fee,
            fee_amount: fee,
            percentage_note: None,
        }
    }

    #[tokio::test]
    async fn test_full_payment_scenario() {
        let (service, notifier) = service_with_notifier();
        let shipment = shipment(&service, 1, "TRK-1").await;

        let stage = service
            .create_stage(1, draft(shipment.id, true, Some(dec!(500))))
            .await
            .unwrap();
        assert_eq!(stage.payment_status(), PaymentStatus::Unpaid);

        let stage = service.submit_receipt(stage.id, evidence()).await.unwrap();
        assert_eq!(stage.payment_status(), PaymentStatus::Pending);
        assert_eq!(stage.receipts().len(), 1);
        assert_eq!(notifier.sent.lock().await.len(), 1);

        let date = NaiveDate::from_ymd_opt(2024, 1, 20).unwrap();
        let stage = service
            .approve_payment(1, stage.id, dec!(500), date)
            .await
            .unwrap();
        assert_eq!(stage.payment_status(), PaymentStatus::Paid);
        assert_eq!(stage.payment_date(), Some(date));
        assert!(stage.is_consistent());
    }

    #[tokio::test]
    async fn test_create_stage_rejects_payment_fields_without_fee() {
        let service = service();
        let shipment = shipment(&service, 1, "TRK-1").await;

        let mut with_fee = draft(shipment.id, false, Some(dec!(100)));
        with_fee.percentage_note = Some("30% on arrival".to_string());
        let err = service.create_stage(1, with_fee).await.unwrap_err();
        assert!(matches!(err, TrackError::ValidationError(_)));

        let (views, _) = service.admin_overview(1, shipment.id).await.unwrap();
        assert!(views.is_empty());
    }

    #[tokio::test]
    async fn test_receipt_on_free_stage_is_invalid_transition() {
        let service = service();
        let shipment = shipment(&service, 1, "TRK-1").await;
        let stage = service
            .create_stage(1, draft(shipment.id, false, None))
            .await
            .unwrap();

        let err = service.submit_receipt(stage.id, evidence()).await.unwrap_err();
        assert!(matches!(err, TrackError::InvalidTransition { .. }));

        let stored = service.stages.get(stage.id).await.unwrap().unwrap();
        assert!(stored.receipts().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_evidence_leaves_stage_untouched() {
        let service = service();
        let shipment = shipment(&service, 1, "TRK-1").await;
        let stage = service
            .create_stage(1, draft(shipment.id, true, Some(dec!(100))))
            .await
            .unwrap();

        let bad = EvidenceFile {
            content_type: "text/plain".to_string(),
            bytes: vec![1],
        };
        let err = service.submit_receipt(stage.id, bad).await.unwrap_err();
        assert!(matches!(err, TrackError::ValidationError(_)));

        let stored = service.stages.get(stage.id).await.unwrap().unwrap();
        assert_eq!(stored.payment_status(), PaymentStatus::Unpaid);
        assert!(stored.receipts().is_empty());
    }

    #[tokio::test]
    async fn test_ownership_checked_on_mutations() {
        let service = service();
        let shipment = shipment(&service, 1, "TRK-1").await;
        let stage = service
            .create_stage(1, draft(shipment.id, true, Some(dec!(100))))
            .await
            .unwrap();

        let err = service
            .create_stage(2, draft(shipment.id, false, None))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackError::Unauthorized));

        let err = service
            .reject_payment(2, stage.id, "wrong amount")
            .await
            .unwrap_err();
        assert!(matches!(err, TrackError::Unauthorized));

        let err = service.delete_stage(2, stage.id).await.unwrap_err();
        assert!(matches!(err, TrackError::Unauthorized));
    }

    #[tokio::test]
    async fn test_double_reject_is_invalid_transition() {
        let service = service();
        let shipment = shipment(&service, 1, "TRK-1").await;
        let stage = service
            .create_stage(1, draft(shipment.id, true, Some(dec!(100))))
            .await
            .unwrap();
        service.submit_receipt(stage.id, evidence()).await.unwrap();

        let stage = service.reject_payment(1, stage.id, "blurry").await.unwrap();
        assert_eq!(stage.payment_status(), PaymentStatus::Unpaid);
        assert_eq!(stage.receipts().len(), 1);

        let err = service
            .reject_payment(1, stage.id, "again")
            .await
            .unwrap_err();
        assert!(matches!(err, TrackError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_tracking_projection_hides_future_stages() {
        let service = service();
        let shipment = shipment(&service, 1, "TRK-7").await;

        let base = Utc::now();
        for (offset, requires_fee) in [(0, false), (60, true), (120, false)] {
            let mut draft = draft(shipment.id, requires_fee, requires_fee.then(|| dec!(50)));
            draft.occurred_at = base + chrono::Duration::seconds(offset);
            service.create_stage(1, draft).await.unwrap();
        }

        let (summary, projection) = service.track_shipment("TRK-7").await.unwrap();
        assert_eq!(summary.tracking_code, "TRK-7");
        assert_eq!(projection.completed.len(), 1);
        let current = projection.current.unwrap();
        assert!(current.requires_fee);
        assert_eq!(current.payment_status, PaymentStatus::Unpaid);
    }

    #[tokio::test]
    async fn test_tracking_unknown_code_is_not_found() {
        let service = service();
        let err = service.track_shipment("NOPE").await.unwrap_err();
        assert!(matches!(err, TrackError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_initiate_payment_substitutes_template() {
        let service = service();
        let shipment = shipment(&service, 1, "TRK-1").await;
        let stage = service
            .create_stage(1, draft(shipment.id, true, Some(dec!(500))))
            .await
            .unwrap();

        let options = service.initiate_payment(stage.id).await.unwrap();
        assert_eq!(options.fee_amount.value(), dec!(500));
        assert_eq!(options.crypto.len(), 1);
        assert_eq!(
            options.fiat[0].message,
            format!("Paying 500 for status {}", stage.id)
        );
        assert!(options.fiat[0].redirect_url.contains("?text=Paying+500"));
    }

    #[tokio::test]
    async fn test_initiate_payment_on_paid_stage_rejected() {
        let service = service();
        let shipment = shipment(&service, 1, "TRK-1").await;
        let stage = service
            .create_stage(1, draft(shipment.id, true, Some(dec!(500))))
            .await
            .unwrap();
        service
            .approve_payment(
                1,
                stage.id,
                dec!(500),
                NaiveDate::from_ymd_opt(2024, 1, 20).unwrap(),
            )
            .await
            .unwrap();

        let err = service.initiate_payment(stage.id).await.unwrap_err();
        assert!(matches!(err, TrackError::PaymentNotRequired));
    }

    #[tokio::test]
    async fn test_delete_cascades_receipts() {
        let service = service();
        let shipment = shipment(&service, 1, "TRK-1").await;
        let stage = service
            .create_stage(1, draft(shipment.id, true, Some(dec!(100))))
            .await
            .unwrap();
        service.submit_receipt(stage.id, evidence()).await.unwrap();

        service.delete_stage(1, stage.id).await.unwrap();
        assert!(service.stages.get(stage.id).await.unwrap().is_none());
        let err = service.delete_stage(1, stage.id).await.unwrap_err();
        assert!(matches!(err, TrackError::NotFound("stage")));
    }

    #[tokio::test]
    async fn test_admin_overview_shares_projection_rule() {
        let service = service();
        let shipment = shipment(&service, 1, "TRK-9").await;
        let base = Utc::now();
        for (offset, requires_fee) in [(0, false), (60, true)] {
            let mut draft = draft(shipment.id, requires_fee, requires_fee.then(|| dec!(50)));
            draft.occurred_at = base + chrono::Duration::seconds(offset);
            service.create_stage(1, draft).await.unwrap();
        }

        let (all, projection) = service.admin_overview(1, shipment.id).await.unwrap();
        assert_eq!(all.len(), 2);
        let (_, public) = service.track_shipment("TRK-9").await.unwrap();
        assert_eq!(projection, public);
    }
}
