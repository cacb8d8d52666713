//! Session coordination for the messaging core.
//!
//! Ties the pieces together for one signed-in user: the conversation store,
//! the realtime change feeds, the reload scheduler that keeps the store
//! fresh without thundering reloads, and the presence trackers. The
//! [`SessionController`] owns all of it and tears it down on sign-out.

mod scheduler;
mod session;

pub use scheduler::ReloadScheduler;
pub use session::SessionController;
