pub mod block;
pub mod call;
pub mod error;
pub mod id;
pub mod mutator;
pub mod names;
pub mod param;
pub mod procedure;
pub mod workspace;
pub mod xml;

// Re-export commonly used types
pub use block::{Block, BlockKind, GenericBlock, Link, Position};
pub use call::{ArgSlot, CallSite, CallState};
pub use error::CoreError;
pub use id::{BlockId, ParamId};
pub use mutator::{MutatorSession, RowKey, SessionRow};
pub use param::{ParamDescriptor, ParamIdRegistry};
pub use procedure::{ProcedureDecl, Signature};
pub use workspace::{ChangeEvent, Workspace};
pub use xml::{read_workspace, write_workspace, CallMutation, DeclarationMutation, MutationArg};
