// rspc core
// Operation model, wire format and link-chain execution shared by every
// transport and by the client facade.

pub mod batch;
pub mod codec;
pub mod error;
pub mod ids;
pub mod link;
pub mod msg;
pub mod operation;
pub mod registry;

pub use batch::{BatchQueue, FLUSH_DELAY};
pub use codec::{decode_batch, decode_frame, decode_response, encode_batch, encode_request};
pub use error::{LinkError, RspcError};
pub use ids::OperationId;
pub use link::{execute, Completion, Link, LinkResult, Next};
pub use msg::{Request, RequestParams, Response, ResponseResult};
pub use operation::{Operation, OperationContext, OperationKind};
pub use registry::PendingRegistry;
