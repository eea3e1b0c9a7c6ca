//! Route guard for protected views.
//!
//! The gate starts in [`GateState::Checking`] and resolves once the upstream
//! auth check finishes. A missing user or a role outside the allowed set both
//! end in a redirect; only the target path tells them apart. Each entry into a
//! redirect issues exactly one navigation.

use profile_shared::{Role, User};
use uuid::Uuid;

pub const DEFAULT_LOGIN_PATH: &str = "/login";
pub const DEFAULT_ROLE_FALLBACK_PATH: &str = "/dashboard";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

impl From<&User> for SessionUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
        }
    }
}

/// What the upstream auth check currently reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSnapshot {
    pub loading: bool,
    pub user: Option<SessionUser>,
}

impl AuthSnapshot {
    pub fn loading() -> Self {
        Self {
            loading: true,
            user: None,
        }
    }

    pub fn resolved(user: Option<SessionUser>) -> Self {
        Self {
            loading: false,
            user,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    Checking,
    Authorized,
    Redirecting { to: String },
}

/// What a guarded view should render for the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateView {
    Loading,
    Protected,
    Nothing,
}

pub trait Navigator {
    fn navigate(&mut self, path: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateOptions {
    /// `None` admits every authenticated user.
    pub allowed_roles: Option<Vec<Role>>,
    pub login_path: String,
    pub role_fallback_path: String,
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            allowed_roles: None,
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            role_fallback_path: DEFAULT_ROLE_FALLBACK_PATH.to_string(),
        }
    }
}

impl GateOptions {
    pub fn with_roles(roles: &[Role]) -> Self {
        Self {
            allowed_roles: Some(roles.to_vec()),
            ..Self::default()
        }
    }
}

pub fn decide(snapshot: &AuthSnapshot, options: &GateOptions) -> GateState {
    if snapshot.loading {
        return GateState::Checking;
    }

    let Some(user) = &snapshot.user else {
        return GateState::Redirecting {
            to: options.login_path.clone(),
        };
    };

    match &options.allowed_roles {
        Some(roles) if !roles.contains(&user.role) => GateState::Redirecting {
            to: options.role_fallback_path.clone(),
        },
        _ => GateState::Authorized,
    }
}

pub struct AuthGate<N: Navigator> {
    navigator: N,
    options: GateOptions,
    snapshot: AuthSnapshot,
    state: GateState,
}

impl<N: Navigator> AuthGate<N> {
    pub fn new(navigator: N, options: GateOptions) -> Self {
        Self {
            navigator,
            options,
            snapshot: AuthSnapshot::loading(),
            state: GateState::Checking,
        }
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    pub fn view(&self) -> GateView {
        match self.state {
            GateState::Checking => GateView::Loading,
            GateState::Authorized => GateView::Protected,
            GateState::Redirecting { .. } => GateView::Nothing,
        }
    }

    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    /// Feeds a new upstream auth state.
    pub fn update(&mut self, snapshot: AuthSnapshot) -> &GateState {
        if snapshot != self.snapshot {
            self.snapshot = snapshot;
            self.evaluate();
        }
        &self.state
    }

    pub fn set_allowed_roles(&mut self, roles: Option<Vec<Role>>) -> &GateState {
        if roles != self.options.allowed_roles {
            self.options.allowed_roles = roles;
            self.evaluate();
        }
        &self.state
    }

    fn evaluate(&mut self) {
        let next = decide(&self.snapshot, &self.options);

        if let GateState::Redirecting { to } = &next {
            if next != self.state {
                tracing::debug!(to = %to, "Auth gate redirecting");
                self.navigator.navigate(to);
            }
        }

        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingNavigator {
        visits: Vec<String>,
    }

    impl Navigator for RecordingNavigator {
        fn navigate(&mut self, path: &str) {
            self.visits.push(path.to_string());
        }
    }

    fn user(role: Role) -> SessionUser {
        SessionUser {
            id: Uuid::nil(),
            email: "asha@example.com".to_string(),
            role,
        }
    }

    fn gate(options: GateOptions) -> AuthGate<RecordingNavigator> {
        AuthGate::new(RecordingNavigator::default(), options)
    }

    #[test]
    fn test_starts_checking() {
        let gate = gate(GateOptions::default());
        assert_eq!(gate.state(), &GateState::Checking);
        assert_eq!(gate.view(), GateView::Loading);
    }

    #[test]
    fn test_loading_shows_loading_regardless_of_user() {
        let mut gate = gate(GateOptions::with_roles(&[Role::Admin]));
        gate.update(AuthSnapshot {
            loading: true,
            user: Some(user(Role::Guest)),
        });

        assert_eq!(gate.view(), GateView::Loading);
        assert!(gate.navigator().visits.is_empty());
    }

    #[test]
    fn test_no_user_redirects_to_login_once() {
        let mut gate = gate(GateOptions::default());
        gate.update(AuthSnapshot::resolved(None));
        gate.update(AuthSnapshot::resolved(None));
        // Role changes re-evaluate but the target is unchanged
        gate.set_allowed_roles(Some(vec![Role::Admin]));

        assert_eq!(
            gate.state(),
            &GateState::Redirecting {
                to: "/login".to_string()
            }
        );
        assert_eq!(gate.view(), GateView::Nothing);
        assert_eq!(gate.navigator().visits, vec!["/login"]);
    }

    #[test]
    fn test_wrong_role_redirects_to_dashboard() {
        let mut gate = gate(GateOptions::with_roles(&[Role::Admin]));
        gate.update(AuthSnapshot::resolved(Some(user(Role::Guest))));

        assert_eq!(
            gate.state(),
            &GateState::Redirecting {
                to: "/dashboard".to_string()
            }
        );
        assert_eq!(gate.navigator().visits, vec!["/dashboard"]);
    }

    #[test]
    fn test_authorized_user_sees_content() {
        let mut gate = gate(GateOptions::with_roles(&[Role::Admin, Role::User]));
        gate.update(AuthSnapshot::resolved(Some(user(Role::User))));

        assert_eq!(gate.state(), &GateState::Authorized);
        assert_eq!(gate.view(), GateView::Protected);
        assert!(gate.navigator().visits.is_empty());
    }

    #[test]
    fn test_no_role_restriction_admits_any_user() {
        let mut gate = gate(GateOptions::default());
        gate.update(AuthSnapshot::resolved(Some(user(Role::Guest))));
        assert_eq!(gate.state(), &GateState::Authorized);
    }

    #[test]
    fn test_reevaluates_when_roles_change() {
        let mut gate = gate(GateOptions::default());
        gate.update(AuthSnapshot::resolved(Some(user(Role::User))));
        assert_eq!(gate.state(), &GateState::Authorized);

        gate.set_allowed_roles(Some(vec![Role::Admin]));
        assert_eq!(gate.view(), GateView::Nothing);
        assert_eq!(gate.navigator().visits, vec!["/dashboard"]);

        gate.set_allowed_roles(None);
        assert_eq!(gate.state(), &GateState::Authorized);
    }

    #[test]
    fn test_logout_after_authorization_redirects() {
        let mut gate = gate(GateOptions::default());
        gate.update(AuthSnapshot::resolved(Some(user(Role::User))));
        gate.update(AuthSnapshot::loading());
        assert_eq!(gate.view(), GateView::Loading);

        gate.update(AuthSnapshot::resolved(None));
        assert_eq!(gate.navigator().visits, vec!["/login"]);
    }

    #[test]
    fn test_switching_redirect_target_navigates_again() {
        let mut gate = gate(GateOptions::with_roles(&[Role::Admin]));
        gate.update(AuthSnapshot::resolved(Some(user(Role::Guest))));
        gate.update(AuthSnapshot::resolved(None));

        assert_eq!(gate.navigator().visits, vec!["/dashboard", "/login"]);
    }

    #[test]
    fn test_custom_fallback_paths() {
        let options = GateOptions {
            allowed_roles: Some(vec![Role::Admin]),
            login_path: "/signin".to_string(),
            role_fallback_path: "/home".to_string(),
        };
        assert_eq!(
            decide(&AuthSnapshot::resolved(None), &options),
            GateState::Redirecting {
                to: "/signin".to_string()
            }
        );
        assert_eq!(
            decide(&AuthSnapshot::resolved(Some(user(Role::User))), &options),
            GateState::Redirecting {
                to: "/home".to_string()
            }
        );
    }
}
