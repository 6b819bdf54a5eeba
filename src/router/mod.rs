//! Event routing and axis aggregation
//!
//! The router is a listener of the reader loop. It classifies each event by
//! type and code and sends it down one of three paths:
//!
//! ```text
//!               ┌─ EV_KEY ─────────────────────────────► "key" (immediately)
//! RawInputEvent ┼─ EV_ABS ──► AbsState ──► abs loop ───► "abs" (fixed rate)
//!  (REL→ABS?)   └─ EV_REL ──► RelState ──► rel loop ───► "rel" (fixed rate)
//! ```
//!
//! [`RawEventWriter`] is registered beside the router and publishes every
//! record on "raw" without coercion.

pub mod axis_state;
pub mod event_router;
pub mod fixed_rate;
pub mod handlers;

pub use axis_state::{AbsState, AxisState, RelState};
pub use event_router::{EventRouter, RawEventWriter};
pub use fixed_rate::spawn_fixed_rate;
pub use handlers::{CodeFilter, EventHandler, EventHandlers};
