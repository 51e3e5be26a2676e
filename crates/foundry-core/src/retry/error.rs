use foundry_types::Code;
use thiserror::Error;

use super::kind::{CallShape, RetryKind};
use crate::transport::RpcStatus;

/// Failure surfaced by the retry layer.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The last attempt's failure, untouched.
    #[error(transparent)]
    Transport(E),

    #[error("retry kind `{kind}` is not implemented for {shape} calls")]
    NotImplemented { kind: RetryKind, shape: CallShape },

    /// The attempt loop ended without a result or an error.
    #[error("retry loop finished after {attempts} attempts without a result")]
    LoopExhausted { attempts: i64 },
}

impl<E: RpcStatus> RetryError<E> {
    pub fn code(&self) -> Code {
        match self {
            Self::Transport(e) => e.code(),
            Self::NotImplemented { .. } => Code::Unimplemented,
            Self::LoopExhausted { .. } => Code::Internal,
        }
    }

    pub fn transport(&self) -> Option<&E> {
        match self {
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_transport(self) -> Option<E> {
        match self {
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}
