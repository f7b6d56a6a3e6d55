mod service;
mod validator;

pub use service::{ChargeError, ChargeIssuer, request_pix_charge};
pub use validator::{
    Amount, TXID_MAX_LEN, TXID_PREFIX, ValidationError, normalize_amount, normalize_txid,
};
