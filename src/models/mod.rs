pub mod order;
pub mod target;

pub use order::{
    AcceptedOrder, Address, AttemptResult, InvoiceInfo, OrderInitInfo, OrderPayload, OrderSecrets,
    WorkerOutcome, RATE_LIMITED_CODE,
};
pub use target::PurchaseTarget;
