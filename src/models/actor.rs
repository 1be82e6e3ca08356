/// Who is calling, as established by the identity layer in front of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    Admin,
    /// Automated collaborator that reports work as performed.
    System,
    Requester(String),
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        matches!(self, Actor::Admin)
    }

    pub fn owns(&self, requester_id: &str) -> bool {
        matches!(self, Actor::Requester(id) if id == requester_id)
    }

    pub fn label(&self) -> &str {
        match self {
            Actor::Admin => "admin",
            Actor::System => "system",
            Actor::Requester(id) => id,
        }
    }
}
