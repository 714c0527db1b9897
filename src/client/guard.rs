use crate::{client::session::SessionState, models::Role};

pub const UNAUTHORIZED_PATH: &str = "/unauthorized";

/// Who may see a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Public,
    Authenticated,
    /// Login/register style pages; signed-in users are sent to `redirect_to`.
    Anonymous { redirect_to: String },
    Role { role: Role, fallback: String },
}

impl Requirement {
    pub fn role(role: Role) -> Self {
        Requirement::Role {
            role,
            fallback: UNAUTHORIZED_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Loading,
    Render,
    /// `from` is the location to return to after logging in.
    Redirect { to: String, from: Option<String> },
    NotFound,
}

impl Decision {
    fn to(to: &str) -> Self {
        Decision::Redirect {
            to: to.to_string(),
            from: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    login_path: String,
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::new("/login")
    }
}

impl RouteGuard {
    pub fn new(login_path: impl Into<String>) -> Self {
        Self {
            login_path: login_path.into(),
        }
    }

    pub fn check(
        &self,
        requirement: &Requirement,
        session: &SessionState,
        location: &str,
    ) -> Decision {
        if session.loading && *requirement != Requirement::Public {
            return Decision::Loading;
        }
        match requirement {
            Requirement::Public => Decision::Render,
            Requirement::Anonymous { redirect_to } => match session.user {
                Some(_) => Decision::to(redirect_to),
                None => Decision::Render,
            },
            Requirement::Authenticated => match session.user {
                Some(_) => Decision::Render,
                None => self.to_login(location),
            },
            Requirement::Role { role, fallback } => match &session.user {
                None => self.to_login(location),
                Some(user) if user.role == *role => Decision::Render,
                Some(_) => Decision::to(fallback),
            },
        }
    }

    fn to_login(&self, location: &str) -> Decision {
        Decision::Redirect {
            to: self.login_path.clone(),
            from: Some(location.to_string()),
        }
    }
}

/// Path patterns (with `:param` segments) and what each requires.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<(String, Requirement)>,
    guard: RouteGuard,
}

impl Default for RouteTable {
    fn default() -> Self {
        let home = || Requirement::Anonymous {
            redirect_to: "/".to_string(),
        };
        Self::new(RouteGuard::default())
            .route("/", Requirement::Public)
            .route("/search", Requirement::Public)
            .route("/product/:id", Requirement::Public)
            .route("/login", home())
            .route("/register", home())
            .route("/dashboard", Requirement::Authenticated)
            .route(UNAUTHORIZED_PATH, Requirement::Public)
    }
}

impl RouteTable {
    pub fn new(guard: RouteGuard) -> Self {
        Self {
            routes: Vec::new(),
            guard,
        }
    }

    pub fn route(mut self, pattern: &str, requirement: Requirement) -> Self {
        self.routes.push((pattern.to_string(), requirement));
        self
    }

    pub fn requirement_for(&self, path: &str) -> Option<&Requirement> {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        self.routes
            .iter()
            .find(|(pattern, _)| matches_pattern(pattern, path))
            .map(|(_, req)| req)
    }

    /// Decision for navigating to `location` (path plus optional query).
    pub fn resolve(&self, location: &str, session: &SessionState) -> Decision {
        match self.requirement_for(location) {
            Some(req) => self.guard.check(req, session, location),
            None => Decision::NotFound,
        }
    }
}

fn matches_pattern(pattern: &str, path: &str) -> bool {
    let trim = |s: &str| s.trim_end_matches('/').to_string();
    let (pattern, path) = (trim(pattern), trim(path));
    let mut want = pattern.split('/');
    let mut got = path.split('/');
    loop {
        match (want.next(), got.next()) {
            (None, None) => return true,
            (Some(w), Some(g)) if w.starts_with(':') && !g.is_empty() => {}
            (Some(w), Some(g)) if w == g => {}
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserProfile;

    fn user(role: Role) -> UserProfile {
        UserProfile {
            id: uuid::Uuid::new_v4(),
            username: "asha".into(),
            email: "asha@example.com".into(),
            full_name: None,
            phone_number: None,
            date_of_birth: None,
            role,
            is_active: true,
            is_verified: true,
            created_at: time::OffsetDateTime::now_utc(),
            last_login: None,
            preferences: None,
        }
    }

    fn signed_in(role: Role) -> SessionState {
        SessionState {
            user: Some(user(role)),
            loading: false,
        }
    }

    fn anonymous() -> SessionState {
        SessionState {
            user: None,
            loading: false,
        }
    }

    #[test]
    fn protected_route_sends_anonymous_users_to_login_with_origin() {
        let guard = RouteGuard::default();
        assert_eq!(
            guard.check(&Requirement::Authenticated, &anonymous(), "/dashboard"),
            Decision::Redirect {
                to: "/login".into(),
                from: Some("/dashboard".into())
            }
        );
        assert_eq!(
            guard.check(&Requirement::Authenticated, &signed_in(Role::User), "/dashboard"),
            Decision::Render
        );
    }

    #[test]
    fn loading_session_waits() {
        let booting = SessionState {
            user: None,
            loading: true,
        };
        let guard = RouteGuard::default();
        assert_eq!(
            guard.check(&Requirement::Authenticated, &booting, "/dashboard"),
            Decision::Loading
        );
        assert_eq!(
            guard.check(&Requirement::role(Role::Admin), &booting, "/admin"),
            Decision::Loading
        );
        assert_eq!(guard.check(&Requirement::Public, &booting, "/"), Decision::Render);
    }

    #[test]
    fn signed_in_users_are_bounced_from_login_and_register() {
        let table = RouteTable::default();
        for path in ["/login", "/register"] {
            assert_eq!(
                table.resolve(path, &signed_in(Role::User)),
                Decision::Redirect {
                    to: "/".into(),
                    from: None
                }
            );
            assert_eq!(table.resolve(path, &anonymous()), Decision::Render);
        }
    }

    #[test]
    fn role_mismatch_goes_to_unauthorized_not_login() {
        let guard = RouteGuard::default();
        let admin_only = Requirement::role(Role::Admin);
        assert_eq!(
            guard.check(&admin_only, &signed_in(Role::User), "/admin"),
            Decision::Redirect {
                to: "/unauthorized".into(),
                from: None
            }
        );
        assert_eq!(guard.check(&admin_only, &signed_in(Role::Admin), "/admin"), Decision::Render);
        assert!(matches!(
            guard.check(&admin_only, &anonymous(), "/admin"),
            Decision::Redirect { ref to, .. } if to == "/login"
        ));
    }

    #[test]
    fn table_matches_params_and_ignores_query() {
        let table = RouteTable::default();
        assert_eq!(table.requirement_for("/product/abc123"), Some(&Requirement::Public));
        assert_eq!(table.requirement_for("/product/"), None);
        assert_eq!(table.requirement_for("/search?q=iPhone%2015"), Some(&Requirement::Public));
        assert_eq!(table.resolve("/nowhere", &anonymous()), Decision::NotFound);
        assert_eq!(
            table.resolve("/dashboard?tab=alerts", &anonymous()),
            Decision::Redirect {
                to: "/login".into(),
                from: Some("/dashboard?tab=alerts".into())
            }
        );
    }
}
