use serde::{Deserialize, Serialize};
use specta::Type;
use uuid::Uuid;

/// Amounts arrive either as JSON numbers or as strings with a `,` or `.`
/// decimal separator.
#[derive(Debug, Clone, Serialize, Deserialize, Type)]
#[serde(untagged)]
pub enum RawAmount {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
#[serde(rename_all = "camelCase")]
pub struct CreateChargeRequest {
    pub checkout_id: Uuid,
    pub amount: RawAmount,
    #[serde(default)]
    pub bump_amount: Option<RawAmount>,
    pub customer_name: String,
    pub customer_email: String,
    #[serde(default)]
    pub customer_document: Option<String>,
    #[serde(default)]
    pub txid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
#[serde(rename_all = "camelCase")]
pub struct UpsellChargeRequest {
    pub payment_id: Uuid,
    pub offer_id: Uuid,
    #[serde(default)]
    pub txid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct ChargeResponse {
    pub success: bool,
    pub txid: String,
    #[serde(rename = "copiaECola")]
    pub copia_e_cola: String,
    #[serde(rename = "imagemQrcodeBase64")]
    pub imagem_qrcode_base64: String,
    pub loc: String,
    #[serde(rename = "expiresAt")]
    pub expires_at: String,
}

/// Provider callback body. Unknown fields are ignored; a body without a
/// `pix` array (e.g. the provider's registration ping) is an empty batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Type)]
pub struct PixCallbackBody {
    #[serde(default)]
    pub pix: Vec<PixCallbackEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct PixCallbackEvent {
    #[serde(default)]
    pub txid: Option<String>,
    #[serde(default, rename = "endToEndId")]
    pub end_to_end_id: Option<String>,
    #[serde(default)]
    pub valor: Option<String>,
    #[serde(default)]
    pub horario: Option<String>,
}
