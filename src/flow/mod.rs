//! Resumable flow engine: stash, step contract, transactions and controller.

pub mod action;
pub mod context;
pub mod controller;
pub mod error;
pub mod input;
pub mod instance;
pub mod memory;
pub mod stash;
pub mod store;
pub mod tx;

pub use action::{Action, ActionName, Disposition, StepError};
pub use context::{ExecutionContext, ExecutionOutcome, HttpContext, InitializationContext};
pub use controller::{ActionDescriptor, FlowController, FlowResponse, ResponseError};
pub use error::{ErrorCode, FlowError};
pub use input::{FieldError, FieldErrorCode, InputData, InputField, InputKind, InputSchema};
pub use instance::{FlowInstance, StepRecord};
pub use memory::{MemoryStore, MemoryTx};
pub use stash::{Stash, StashKey, StashValue, StashValueKind};
pub use store::{FlowStore, PgFlowStore};
pub use tx::{PgTransactionSource, PgTx, TransactionSource};
