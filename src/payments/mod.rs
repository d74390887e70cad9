pub mod client;
pub mod gateway;
pub mod types;

pub use client::{HttpPaymentApi, PaymentApi, PaymentClientError};
pub use types::{PaymentMethod, PaymentStatus};
