pub mod event_reception;
pub mod lookup;

pub use event_reception::{EventReception, NewEventReception};
pub use lookup::{SignalType, System, Zone};
