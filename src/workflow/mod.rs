pub mod attempt_ctx;
pub mod reservation;
pub mod submission_worker;

pub use attempt_ctx::AttemptCtx;
pub use reservation::{ReservationFlow, ReserveApi, ReserveOutcome};
pub use submission_worker::{LoopMode, SeckillApi, SubmissionWorker};
