//! Session providers, and the glue that keeps an [`Engine`] following one.

use std::{cell::RefCell, rc::Rc};

use slotmap::SlotMap;

use crate::{AuthError, CounterStore, Engine, ListenerKey, Session, UserId};

type SessionListener = Rc<dyn Fn(&Session)>;

/// Supplies the signed-in user and announces sign-in/sign-out transitions.
#[allow(async_fn_in_trait)]
pub trait SessionProvider {
    /// Whatever a sign-in request needs (an identity, a token, ...).
    type Credential;

    fn session(&self) -> Session;

    /// `listener` runs on every transition, but not for the session current at subscription time.
    fn subscribe(&self, listener: Box<dyn Fn(&Session)>) -> ListenerKey;

    fn unsubscribe(&self, key: ListenerKey);

    async fn sign_in(&self, credential: Self::Credential) -> Result<UserId, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;
}

/// A provider that lives in-process. The credential is the user id itself.
#[derive(Clone, Default)]
pub struct LocalSessionProvider {
    state: Rc<RefCell<ProviderState>>,
}

#[derive(Default)]
struct ProviderState {
    session: Session,
    listeners: SlotMap<ListenerKey, SessionListener>,
    reject_next: Option<String>,
}

impl LocalSessionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next sign-in or sign-out request fail with `message`.
    pub fn reject_next(&self, message: impl Into<String>) {
        self.state.borrow_mut().reject_next = Some(message.into());
    }

    fn take_rejection(&self) -> Result<(), AuthError> {
        match self.state.borrow_mut().reject_next.take() {
            Some(message) => Err(AuthError::Rejected(message)),
            None => Ok(()),
        }
    }

    fn transition(&self, session: Session) {
        let listeners: Vec<SessionListener> = {
            let mut state = self.state.borrow_mut();
            if state.session == session {
                return;
            }
            state.session = session.clone();
            state.listeners.values().cloned().collect()
        };
        for listener in listeners {
            listener(&session);
        }
    }
}

impl SessionProvider for LocalSessionProvider {
    type Credential = String;

    fn session(&self) -> Session {
        self.state.borrow().session.clone()
    }

    fn subscribe(&self, listener: Box<dyn Fn(&Session)>) -> ListenerKey {
        self.state.borrow_mut().listeners.insert(Rc::from(listener))
    }

    fn unsubscribe(&self, key: ListenerKey) {
        self.state.borrow_mut().listeners.remove(key);
    }

    async fn sign_in(&self, credential: String) -> Result<UserId, AuthError> {
        self.take_rejection()?;
        let user = UserId::parse(credential)?;
        self.transition(Session::SignedIn(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.take_rejection()?;
        self.transition(Session::SignedOut);
        Ok(())
    }
}

/// State of the sign-in control: whether a request is in flight, and the last error.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthStatus {
    pub busy: bool,
    pub error: Option<String>,
}

/// Keeps an engine following a provider's session for as long as it lives.
pub struct SessionBinding<S: CounterStore + 'static, P: SessionProvider> {
    engine: Engine<S>,
    provider: P,
    key: ListenerKey,
    status: RefCell<AuthStatus>,
}

impl<S: CounterStore + 'static, P: SessionProvider> SessionBinding<S, P> {
    /// Subscribes `engine` to `provider` and brings it into the provider's current session.
    pub fn new(engine: Engine<S>, provider: P) -> Self {
        let key = {
            let engine = engine.clone();
            provider.subscribe(Box::new(move |session: &Session| {
                engine.switch_session(session.clone())
            }))
        };
        engine.switch_session(provider.session());

        Self {
            engine,
            provider,
            key,
            status: RefCell::new(AuthStatus::default()),
        }
    }

    pub fn engine(&self) -> &Engine<S> {
        &self.engine
    }

    pub fn auth_status(&self) -> AuthStatus {
        self.status.borrow().clone()
    }

    pub async fn sign_in(&self, credential: P::Credential) -> Result<UserId, AuthError> {
        self.start_request();
        let result = self.provider.sign_in(credential).await;
        self.finish_request(result.as_ref().err());
        result
    }

    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.start_request();
        let result = self.provider.sign_out().await;
        self.finish_request(result.as_ref().err());
        result
    }

    fn start_request(&self) {
        *self.status.borrow_mut() = AuthStatus {
            busy: true,
            error: None,
        };
    }

    fn finish_request(&self, error: Option<&AuthError>) {
        let mut status = self.status.borrow_mut();
        status.busy = false;
        if let Some(e) = error {
            log::error!("Auth error: {e}");
            status.error = Some(e.to_string());
        }
    }
}

impl<S: CounterStore + 'static, P: SessionProvider> Drop for SessionBinding<S, P> {
    fn drop(&mut self) {
        self.provider.unsubscribe(self.key);
    }
}
