use std::fmt;

/// Client-side navigation targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Login,
    Signup,
    Profile(String),
    NotFound(String),
}

impl Route {
    pub fn parse(path: &str) -> Route {
        let trimmed = path.split(['?', '#']).next().unwrap_or_default();
        let trimmed = trimmed.trim_end_matches('/');
        let segments: Vec<&str> = trimmed
            .trim_start_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        match segments.as_slice() {
            [] => Route::Home,
            ["login"] => Route::Login,
            ["signup"] => Route::Signup,
            ["profile", user_id] => match urlencoding::decode(user_id) {
                Ok(id) => Route::Profile(id.into_owned()),
                Err(_) => Route::NotFound(path.to_string()),
            },
            _ => Route::NotFound(path.to_string()),
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Home => "/".to_string(),
            Route::Login => "/login".to_string(),
            Route::Signup => "/signup".to_string(),
            Route::Profile(user_id) => format!("/profile/{}", urlencoding::encode(user_id)),
            Route::NotFound(path) => path.clone(),
        }
    }

    /// Home and profile pages need a signed-in user.
    pub fn is_protected(&self) -> bool {
        matches!(self, Route::Home | Route::Profile(_))
    }

    /// Where navigating to this route actually lands.
    pub fn guard(&self, signed_in: bool) -> Route {
        if self.is_protected() && !signed_in {
            return Route::Login;
        }
        self.clone()
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}
