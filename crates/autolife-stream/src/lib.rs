//! Autolife Stream
//!
//! The client side of the agent's task event stream.
//!
//! # Architecture
//!
//! ```text
//! TaskStreamController::start(task_id, text)
//!        │
//!        ▼ spawned pump (one per run, own CancellationToken)
//! AgentTransport::open_stream ──► EventStream (SseFrame)
//!        │                              │
//!        │ HttpTransport: GET           │ TaskEvent::decode
//!        │ ScriptedTransport: replay    ▼
//!        │                       TaskStateMachine::apply
//!        │                              │
//!        │                              ▼ on terminal transition, once
//!        │                       ConsoleStore: chat message,
//!        │                       archived run, activity record
//!        ▼
//! TaskStreamController::cancel ──► AgentTransport::cancel_task (best effort)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use autolife_store::MemoryStore;
//! use autolife_stream::{ScriptedTransport, TaskStreamController, demo_script};
//!
//! let store = Arc::new(MemoryStore::new());
//! let transport = Arc::new(ScriptedTransport::with_script(demo_script("task_1")));
//! let controller = TaskStreamController::new(transport, store.clone());
//!
//! controller.start("task_1", "给张三发微信说你好");
//! controller.wait_idle().await;
//! assert_eq!(store.messages().len(), 1);
//! ```

mod controller;
mod error;
mod scripted;
mod sse;
mod transport;

pub use controller::{CONNECTION_LOST_CHAT_MESSAGE, TaskStreamController};
pub use error::TransportError;
pub use scripted::{OpenedStream, ScriptStep, ScriptedTransport, demo_script};
pub use sse::{DEFAULT_EVENT, SseDecoder, SseFrame, decode_stream};
pub use transport::{AgentTransport, EventStream, HttpTransport};
