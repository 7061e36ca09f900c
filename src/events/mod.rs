//! # Events Module
//!
//! Event-driven architecture for GUI-ready progress reporting.
//!
//! ## Design
//! The import engine emits events through channels, allowing any UI
//! (CLI, GUI, web) to subscribe and display progress. Every per-file
//! state transition and every aggregate counter update is an event;
//! the engine never talks to a terminal directly.
//!
//! ## Example
//! ```rust,ignore
//! let (sender, receiver) = EventChannel::new();
//!
//! // In a separate thread, listen for events
//! std::thread::spawn(move || {
//!     for event in receiver.iter() {
//!         match event {
//!             Event::Copy(CopyEvent::Progress(p)) => {
//!                 println!("Copied {}/{} bytes", p.bytes_copied, p.bytes_total)
//!             }
//!             _ => {}
//!         }
//!     }
//! });
//!
//! // Hand the sender to the coordinator and run
//! let report = coordinator.run()?;
//! ```

mod channel;
mod types;

pub use channel::{null_sender, EventChannel, EventReceiver, EventSender};
pub use types::*;
