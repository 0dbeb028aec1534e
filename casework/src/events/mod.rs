//! Case event stream
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  Lifecycle   │────▶│  Event Bus   │────▶│  Presenters  │
//! │  (publish)   │     │  (broadcast) │     │   (recv)     │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use casework::events::{EventBus, EventFilter};
//! use casework::state::CaseKind;
//!
//! let bus = EventBus::new().shared();
//! let mut tickets = bus.subscribe_filtered(EventFilter::new().kind(CaseKind::Ticket));
//! let event = tickets.recv().await?;
//! ```

pub mod bus;
pub mod types;

pub use bus::{EventBus, EventBusError, EventBusResult, EventFilter, FilteredReceiver, SharedEventBus};
pub use types::CaseEvent;
