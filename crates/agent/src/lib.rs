//! Dialogue orchestration runtime for the assure insurance assistant
//!
//! This crate is the control plane of the assure system - the runtime that:
//! - Routes each user turn through a priority-ordered guard chain
//! - Applies autonomous policies (escalation, self-correction, nudges)
//! - Runs the staged slot-collection engine until a recommendation fires
//! - Pins unfinished service flows so credential fragments aren't misread
//!
//! # Architecture
//!
//! One turn follows a constrained loop:
//! 1. **Routing** (`router`) - Ordered guards emit a `RoutingDirective`
//! 2. **Policy checks** (`policies`) - Escalate/self-correct before intent wins
//! 3. **Dispatch** (`runtime`) - Apply the state delta, run the target handler
//! 4. **Collection** (`slots`) / **Service** (`service`) - Staged sub-flows
//!
//! # Key Types
//!
//! - `AgentRuntime` - Main turn loop (see `runtime` module)
//! - `AdapterSet` - Pluggable classification/generation capabilities (`llm`)
//! - `Router` - The supervisor guard chain (`router`)
//!
//! # Safety Principle
//!
//! The language model is strictly a translator. It NEVER decides routing,
//! tier selection, or slot validity. Those are deterministic decisions made
//! by the orchestration core in `assure-core`.

pub mod llm;
pub mod policies;
pub mod router;
pub mod runtime;
pub mod service;
pub mod slots;
pub mod telemetry;

pub use llm::{AdapterSet, TurnContext};
pub use router::{Router, RouterDecision};
pub use runtime::{AgentRuntime, TurnOutcome};
pub use slots::{SlotEngine, DECLINE_SLOT};
