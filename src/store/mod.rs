//! Parameterized-SQL accessors over the embedded database.
//!
//! Every accessor borrows the single process-wide pool from [`Database`];
//! none of them opens a transaction spanning more than one call.
//!
//! [`Database`]: crate::database::Database

pub mod events;
pub mod outbox;
pub mod users;

pub use events::EventStore;
pub use outbox::NotificationOutbox;
pub use users::UserStore;
