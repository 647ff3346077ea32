use tokio::sync::watch;

use crate::model::{AuthorProfile, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub id: UserId,
    pub username: String,
}

impl From<&SessionUser> for AuthorProfile {
    fn from(user: &SessionUser) -> Self {
        AuthorProfile {
            username: user.username.clone(),
            display_name: None,
            avatar_url: None,
        }
    }
}

/// Read-only auth context, created once at the application root and cloned
/// into each reconciler. Sign-in changes flow through the identity provider's
/// controller; reconcilers never mutate it.
#[derive(Debug, Clone)]
pub struct Session {
    receiver: watch::Receiver<Option<SessionUser>>,
}

impl Session {
    pub fn current_user(&self) -> Option<SessionUser> {
        self.receiver.borrow().clone()
    }

    /// Resolves on the next sign-in or sign-out. Returns `false` once the
    /// identity provider is gone.
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }
}

/// Write side of the auth context, held by the identity provider glue.
#[derive(Debug)]
pub struct SessionController {
    sender: watch::Sender<Option<SessionUser>>,
}

impl SessionController {
    pub fn new(initial: Option<SessionUser>) -> (SessionController, Session) {
        let (sender, receiver) = watch::channel(initial);
        (SessionController { sender }, Session { receiver })
    }

    pub fn sign_in(&self, user: SessionUser) {
        let _ = self.sender.send(Some(user));
    }

    pub fn sign_out(&self) {
        let _ = self.sender.send(None);
    }
}
