pub mod notification;
pub mod payout;

pub use notification::{
    spawn_delivery_worker, LogNotifier, NotificationDispatcher, NotificationScheduler, Notifier,
};
pub use payout::{PayoutError, PayoutReceipt, PayoutRequest, PayoutService, PayoutSettings};
