//! Domain models: opaque records and the pull's time window

mod record;
mod window;

pub use record::{ConversationId, Record};
pub use window::{Delta, DeltaUnit, TimeWindow, WindowRequest, parse_instant};
