//! Validation, routing and result envelopes

mod dispatcher;
mod result;
#[cfg(test)]
pub(crate) mod test_support;

pub use dispatcher::Dispatcher;
pub use result::{
    payload_text, FailureKind, InvocationRequest, InvocationResult, StreamEvent, ToolFailure,
};
