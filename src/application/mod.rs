pub mod cart_service;
pub mod order_service;
pub mod payment_service;
pub mod warranty_service;

use crate::domain::errors::DomainError;

/// Repositories talk to the database over blocking diesel connections, so
/// every call is moved onto tokio's blocking pool.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, DomainError>
where
    F: FnOnce() -> Result<T, DomainError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DomainError::Internal(format!("blocking task failed: {e}")))?
}

/// Who is asking, as far as ownership checks care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requester {
    Admin,
    User(uuid::Uuid),
    Anonymous,
}

impl Requester {
    pub fn user_id(&self) -> Option<uuid::Uuid> {
        match self {
            Requester::User(id) => Some(*id),
            _ => None,
        }
    }

    /// Guest resources are open to anyone holding their id; owned ones only
    /// to their owner and admins.
    pub fn may_act_on(&self, owner: Option<uuid::Uuid>) -> bool {
        match (self, owner) {
            (Requester::Admin, _) | (_, None) => true,
            (Requester::User(id), Some(owner)) => *id == owner,
            (Requester::Anonymous, Some(_)) => false,
        }
    }
}
