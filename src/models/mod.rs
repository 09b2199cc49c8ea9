pub mod user;
pub mod event;
pub mod notification;

pub use user::{NewUser, User, UserUpdate};
pub use event::{Event, EventUpdate, NewEvent};
pub use notification::{NewNotification, OutboxEntry};
