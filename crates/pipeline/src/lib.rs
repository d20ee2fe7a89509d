//! The retrieval-augmented chat turn pipeline.
//!
//! One turn flows through:
//! 1. [`trimmer`]: bound stored history by a character budget
//! 2. [`assembler`]: order system prompt, retrieved documents, history and the user message
//! 3. [`schema`]: convert the tool catalog to the provider's function schema
//! 4. [`relay`]: stream the completion, forward frames, merge tool-call fragments
//! 5. [`invoker`]: run the requested tools (at most one extra completion round)
//! 6. [`persister`]: append the finished turn to history and the chat log
//!
//! [`ChatPipeline`] wires these together around injected store and provider handles.

pub mod assembler;
pub mod completion;
pub mod invoker;
pub mod persister;
pub mod relay;
pub mod schema;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod trimmer;
pub mod turn;
pub mod wire;

pub use completion::{CompletionReply, completion_prompt};
pub use invoker::ToolInvoker;
pub use persister::TurnPersister;
pub use relay::{Relay, RelayOutcome, RelayState, ToolCallFragment};
pub use turn::{ChatPipeline, ChatReply, ChatRequest, PipelineSettings, PreparedTurn, TurnStream};
pub use wire::{FrameEncoder, WireFrame, WireMode};
