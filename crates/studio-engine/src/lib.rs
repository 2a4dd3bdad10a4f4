pub mod api;
pub mod app;
pub mod config;
pub mod dispatch;
pub mod journal;
pub mod params;
pub mod session;
pub mod slots;

#[cfg(test)]
mod testing;

pub use api::{DeleteOutcome, HistoryListing, HttpStudioClient, StudioApi};
pub use app::{Prompter, StudioApp};
pub use config::StudioConfig;
pub use dispatch::{dispatch, ChatReply};
pub use session::{run_session, CancelToken, SessionControl, SessionOutcome, SessionState};
