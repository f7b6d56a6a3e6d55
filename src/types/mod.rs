pub mod api_error;
pub mod payment;
pub mod delivery;
pub mod webhook;
pub mod charge;

#[allow(unused_imports)]
pub use api_error::{ApiErrorCode, ApiErrorResponse};
#[allow(unused_imports)]
pub use payment::{
    CancelPaymentResponse, OfferKind, PaymentKind, PaymentRecord, PaymentStatus,
    SecondaryPaymentRecord,
};
#[allow(unused_imports)]
pub use delivery::{DeliveryLog, DeliveryType};
#[allow(unused_imports)]
pub use webhook::{
    CreateWebhookRequest, CreateWebhookResponse, ListAttemptsResponse, ListWebhooksResponse,
    WebhookAttemptLog, WebhookAttemptOutcome, WebhookRegistration,
};
#[allow(unused_imports)]
pub use charge::{
    ChargeResponse, CreateChargeRequest, PixCallbackBody, PixCallbackEvent, RawAmount,
    UpsellChargeRequest,
};
