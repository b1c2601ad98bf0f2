//! Dispatch recording for tributary
//!
//! [`EventRecorder`] is a [`DispatchObserver`](tributary_core::DispatchObserver)
//! that keeps one [`DispatchRecord`] per processed event. Records can be
//! written to and read back from JSON Lines files with [`session`].
//!
//! While suspended, the recorder intercepts events instead of letting them
//! reach handlers, which lets a debugging tool freeze a UI without detaching
//! anything.
//!
//! # Example
//!
//! ```no_run
//! use tributary_core::EventCoordinator;
//! use tributary_observe::{session, EventRecorder};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let coordinator = EventCoordinator::new();
//! let recorder = EventRecorder::attach(&coordinator);
//!
//! // ... send events ...
//!
//! session::write_jsonl("dispatch.jsonl", &recorder.records())?;
//! let replayed = session::read_jsonl("dispatch.jsonl")?;
//! assert_eq!(replayed.len(), recorder.records().len());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod record;
pub mod recorder;
pub mod session;

pub use error::ObserveError;
pub use record::DispatchRecord;
pub use recorder::EventRecorder;
