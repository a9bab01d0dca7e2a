use super::stage::{FeeAmount, PaymentStatus, Stage};
use crate::error::{Result, TrackError};
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

/// An admin-registered crypto wallet a tracker may pay into.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct CryptoDestination {
    pub currency: String,
    pub address: String,
    #[serde(default)]
    pub label: Option<String>,
}

/// An admin-registered fiat redirect target, e.g. a messaging-based payment
/// request service.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct FiatPlatform {
    pub name: String,
    pub base_url: String,
    /// May contain `{amount}` and `{statusId}` placeholders.
    pub message_template: String,
}

/// A fiat platform with its template already substituted for one stage.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct FiatRedirect {
    pub name: String,
    pub message: String,
    pub redirect_url: String,
}

impl FiatPlatform {
    /// Substitutes `{amount}` and `{statusId}` and builds the ready-to-use
    /// redirect URL (`base_url + "?text=" + urlencode(message)`).
    pub fn redirect(&self, fee: FeeAmount, stage_id: u64) -> FiatRedirect {
        let message = self
            .message_template
            .replace("{amount}", &fee.to_string())
            .replace("{statusId}", &stage_id.to_string());
        let encoded: String = form_urlencoded::byte_serialize(message.as_bytes()).collect();
        FiatRedirect {
            name: self.name.clone(),
            redirect_url: format!("{}?text={}", self.base_url, encoded),
            message,
        }
    }
}

/// Everything a tracker needs to settle one stage's fee.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct PaymentOptions {
    pub stage_id: u64,
    pub stage_title: String,
    pub fee_amount: FeeAmount,
    pub crypto: Vec<CryptoDestination>,
    pub fiat: Vec<FiatRedirect>,
}

/// Assembles the payment options for a stage, or rejects with
/// `PaymentNotRequired` when the stage needs no fee or is already settled.
pub fn payment_options(
    stage: &Stage,
    crypto: Vec<CryptoDestination>,
    platforms: &[FiatPlatform],
) -> Result<PaymentOptions> {
    if !stage.requires_fee() || stage.payment_status() == PaymentStatus::Paid {
        return Err(TrackError::PaymentNotRequired);
    }
    // requires_fee stages always carry a fee amount (creation invariant).
    let fee = stage.fee_amount().ok_or_else(|| {
        TrackError::InternalError(
            format!("stage {} requires a fee but has no amount", stage.id).into(),
        )
    })?;

    let fiat = platforms.iter().map(|p| p.redirect(fee, stage.id)).collect();
    Ok(PaymentOptions {
        stage_id: stage.id,
        stage_title: stage.title.clone(),
        fee_amount: fee,
        crypto,
        fiat,
    })
}
