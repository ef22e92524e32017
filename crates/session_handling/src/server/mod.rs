//! Server-side session handling: authorization of joins, the roster, and
//! session teardown.

mod notifier;
mod session;

pub use notifier::{NotificationStats, NotificationStatsSnapshot};
pub use session::SessionServer;
