use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Login wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct LoginData {
    pub username: String,
    pub password: String,
}

impl LoginData {
    /// Username: 3-32 ASCII alphanumerics.
    pub fn valid_username(&self) -> bool {
        (3..=32).contains(&self.username.len())
            && self.username.chars().all(|c| c.is_ascii_alphanumeric())
    }

    /// Password: 8-128 characters, no spaces.
    pub fn valid_password(&self) -> bool {
        let len = self.password.chars().count();
        (8..=128).contains(&len) && !self.password.contains(' ')
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
}

/// Body of `/verify` and `/logout` responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthStatusResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(username: &str, password: &str) -> LoginData {
        LoginData {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn username_rules() {
        assert!(data("bob", "password1").valid_username());
        assert!(data("Admin42", "password1").valid_username());
        assert!(!data("ab", "password1").valid_username());
        assert!(!data("user_name", "password1").valid_username());
        assert!(!data(&"a".repeat(33), "password1").valid_username());
    }

    #[test]
    fn password_rules() {
        assert!(data("bob", "12345678").valid_password());
        assert!(!data("bob", "1234567").valid_password());
        assert!(!data("bob", "has space1").valid_password());
        assert!(!data("bob", &"p".repeat(129)).valid_password());
    }
}
