use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use lifeline_platform::Platform;
use lifeline_types::api::{NewAccount, Session};
use lifeline_types::models::{Profile, Role};

use crate::error::{AuthFailure, FlowError};
use crate::validation;

/// A signed-in user: the platform session plus the profile that fixes
/// their role.
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub session: Session,
    pub profile: Profile,
}

impl Principal {
    pub fn user_id(&self) -> Uuid {
        self.session.user_id
    }

    pub fn role(&self) -> Role {
        self.profile.role
    }

    pub(crate) fn require(&self, role: Role) -> Result<(), FlowError> {
        if self.role() == role { Ok(()) } else { Err(FlowError::WrongRole(role)) }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IdentityState {
    /// Restoring a stored session has not finished yet.
    Unknown,
    SignedOut,
    SignedIn(Principal),
}

impl IdentityState {
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            IdentityState::SignedIn(p) => Some(p),
            _ => None,
        }
    }
}

/// Resolve a stored access token into an identity. Anything short of a live
/// session with a profile counts as signed out.
pub async fn resolve<P: Platform>(platform: &P, access_token: Option<&str>) -> IdentityState {
    let Some(token) = access_token.filter(|t| !t.is_empty()) else {
        return IdentityState::SignedOut;
    };

    let session = match platform.restore_session(token).await {
        Ok(Some(session)) => session,
        Ok(None) => return IdentityState::SignedOut,
        Err(e) => {
            warn!("Session restore failed: {}", e);
            return IdentityState::SignedOut;
        }
    };

    match platform.fetch_profile(&session).await {
        Ok(Some(profile)) => IdentityState::SignedIn(Principal { session, profile }),
        Ok(None) => {
            warn!("No profile for user {}", session.user_id);
            IdentityState::SignedOut
        }
        Err(e) => {
            warn!("Profile lookup for {} failed: {}", session.user_id, e);
            IdentityState::SignedOut
        }
    }
}

/// Owns the current identity and tells dependents when it changes.
///
/// Created once per front-end instance: `init` on start, `dispose` at
/// shutdown. Dependents hold a receiver from [`IdentityContext::watch`].
pub struct IdentityContext<P: Platform> {
    platform: P,
    state: watch::Sender<IdentityState>,
}

impl<P: Platform> IdentityContext<P> {
    pub fn new(platform: P) -> Self {
        let (state, _) = watch::channel(IdentityState::Unknown);
        Self { platform, state }
    }

    /// Restore the stored session, if any. The state stays `Unknown` until
    /// this returns.
    pub async fn init(&self, stored_token: Option<&str>) -> IdentityState {
        let resolved = resolve(&self.platform, stored_token).await;
        if let IdentityState::SignedIn(p) = &resolved {
            info!("Restored session for {} ({})", p.profile.email, p.role());
        }
        self.state.send_replace(resolved.clone());
        resolved
    }

    pub fn watch(&self) -> watch::Receiver<IdentityState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> IdentityState {
        self.state.borrow().clone()
    }

    pub fn principal(&self) -> Option<Principal> {
        self.state.borrow().principal().cloned()
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Principal, AuthFailure> {
        validation::validate_sign_in(email, password)?;

        let session = self.platform.sign_in(email, password).await?;
        let principal = self.load_principal(session).await?;

        info!("{} signed in as {}", principal.profile.email, principal.role());
        self.state.send_replace(IdentityState::SignedIn(principal.clone()));
        Ok(principal)
    }

    /// Register and sign in. The role given here is fixed for the account's
    /// lifetime.
    pub async fn sign_up(&self, account: &NewAccount) -> Result<Principal, AuthFailure> {
        validation::validate_sign_up(&account.email, &account.password, &account.full_name)?;

        let session = self.platform.sign_up(account).await?;
        let principal = self.load_principal(session).await?;

        info!("{} registered as {}", principal.profile.email, principal.role());
        self.state.send_replace(IdentityState::SignedIn(principal.clone()));
        Ok(principal)
    }

    /// Local state is signed out either way; a platform failure is still
    /// reported.
    pub async fn sign_out(&self) -> Result<(), AuthFailure> {
        let previous = self.state.send_replace(IdentityState::SignedOut);
        let Some(principal) = previous.principal() else {
            return Ok(());
        };

        info!("{} signed out", principal.profile.email);
        self.platform.sign_out(&principal.session).await?;
        Ok(())
    }

    /// Drops the state channel; every watcher sees it close.
    pub fn dispose(self) {
        info!("Identity context disposed");
    }

    async fn load_principal(&self, session: Session) -> Result<Principal, AuthFailure> {
        let profile = self
            .platform
            .fetch_profile(&session)
            .await?
            .ok_or_else(|| AuthFailure::Remote("Profile not found".into()))?;
        Ok(Principal { session, profile })
    }
}
