use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use anyhow::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // User ID (Subject)
    pub exp: usize,  // Expiration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>, // "student" or "teacher"
}

/// Verifies HS256 bearer tokens issued by the app's auth backend.
pub struct JwtManager {
    decoding_key: DecodingKey,
}

impl JwtManager {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(
            token,
            &self.decoding_key,
            &Validation::new(Algorithm::HS256),
        )?;
        Ok(token_data.claims)
    }
}

/// Sign a token the way the auth backend does.
#[cfg(test)]
pub(crate) fn issue_token(secret: &str, user_id: &str, role: Option<&str>, ttl_seconds: u64) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as usize;
    let claims = Claims {
        sub: user_id.to_string(),
        exp: now + ttl_seconds as usize,
        role: role.map(str::to_string),
    };

    encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_subject() {
        let jwt = JwtManager::new("classroom-secret");
        let token = issue_token("classroom-secret", "student-42", Some("student"), 600);

        let claims = jwt.validate_token(&token).unwrap();
        assert_eq!(claims.sub, "student-42");
        assert_eq!(claims.role.as_deref(), Some("student"));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue_token("a", "u1", None, 600);
        assert!(JwtManager::new("b").validate_token(&token).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(JwtManager::new("a").validate_token("not.a.jwt").is_err());
    }
}
