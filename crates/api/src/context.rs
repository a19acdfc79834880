use signup_core::UserId;

/// The participant a request acts for.
///
/// Identity is established by the upstream auth gateway; this service only
/// reads the id it forwards.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UserContext {
    user_id: UserId,
}

impl UserContext {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}
