pub mod auth_session;
pub mod backoff;
pub mod qr_presenter;
pub mod remote_clock;
pub mod trigger_scheduler;

pub use auth_session::{AuthApi, AuthSession, LoginPolling, QrPresenter, SessionState, TicketPoll};
pub use backoff::{Backoff, RetryPolicy};
pub use qr_presenter::FileQrPresenter;
pub use remote_clock::{ClockOffset, RemoteClock, ServerTimeProbe};
pub use trigger_scheduler::{TriggerOutcome, TriggerScheduler};
