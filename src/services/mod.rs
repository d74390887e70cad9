//! Services module for checkout orchestration and backend-facing business logic

pub mod checkout;
pub mod idempotency;
pub mod orders;
pub mod payment_linker;
pub mod query_cache;
pub mod session_storage;
pub mod transactions;

// Re-export checkout types
pub use checkout::{
    CheckoutConfig, CheckoutError, CheckoutOrchestrator, CheckoutOutcome, CheckoutPorts,
    CheckoutRequest, CheckoutUi, FormValidator, Navigator, Notifier, StandardFormValidator,
};

#[cfg(feature = "cache")]
pub use idempotency::RedisOrderLedger;
pub use idempotency::{ledger_key, LedgerEntry, LedgerError, MemoryOrderLedger, OrderLedger};
pub use orders::{OrderClient, OrderDraft, OrderService, OrderServiceError, OrderStatus};
pub use payment_linker::{LinkOutcome, PaymentLinker, PAYMENT_REFERENCE_KEY};
pub use query_cache::QueryCache;
pub use session_storage::{MemorySessionStorage, SessionStorage};
