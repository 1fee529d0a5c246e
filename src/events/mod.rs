//! Named-event publish/subscribe with per-cycle "triggered" tracking.

pub mod bus;
pub mod stream;
pub mod turn;

pub use bus::{BusEvent, EventBus, EventHandler};
pub use stream::{StreamEvent, StreamEventKind};
pub use turn::{TurnEvent, TurnEventKind};
