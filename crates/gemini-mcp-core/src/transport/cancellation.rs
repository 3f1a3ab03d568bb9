//! Cancellation scopes for connections
//!
//! Each connection owns one scope; every call it starts gets a child token, so
//! closing the connection stops all of its calls at once.

use tokio_util::sync::CancellationToken;

/// Root cancellation token of one connection
#[derive(Debug, Clone)]
pub struct SessionCancellation {
    token: CancellationToken,
}

impl SessionCancellation {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Cancel every call started from this scope
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token for one call; cancelled with the scope or on its own
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}

impl Default for SessionCancellation {
    fn default() -> Self {
        Self::new()
    }
}
