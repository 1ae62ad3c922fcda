mod filter;
mod tracker;
mod types;


pub use filter::{ContactSample, DebounceFilter, FilterDecision, SampleKind};
pub use tracker::ContactTracker;
pub use types::{Contact, ContactId, ContactUpdate, RawEventKind, RawTouchEvent};
