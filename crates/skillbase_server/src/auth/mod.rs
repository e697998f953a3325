//! API token issuing and request authorization.
//!
//! Tokens look like `skb_<prefix>_<secret>`. Only a sha256 digest of the
//! full token is stored; lookup goes through the short prefix so a scan
//! never compares more than a handful of digests. Clients can send the
//! token either as HTTP Basic (in the username or the password slot,
//! matching what git's credential prompt produces) or as a Bearer header.

use axum::http::HeaderMap;
use base64::Engine as _;
use rand::Rng;
use rand::distributions::Alphanumeric;
use sha2::{Digest, Sha256};

use crate::db::{ApiTokenRecord, CatalogRepo, CollectionInfo, TokenScope, Visibility};
use crate::error::ApiError;

const PREFIX_LEN: usize = 8;
const SECRET_LEN: usize = 32;

/// A freshly issued token. The plaintext exists only in this value.
pub struct IssuedToken {
    pub id: String,
    pub token: String,
}

#[derive(Clone)]
pub struct TokenService {
    repo: CatalogRepo,
}

impl TokenService {
    pub fn new(repo: CatalogRepo) -> Self {
        Self { repo }
    }

    /// Mint a token for an account and store its digest.
    pub fn issue(
        &self,
        account_id: &str,
        scope: TokenScope,
    ) -> Result<IssuedToken, rusqlite::Error> {
        let prefix = random_string(PREFIX_LEN);
        let secret = random_string(SECRET_LEN);
        let token = format!("skb_{prefix}_{secret}");
        let record = ApiTokenRecord {
            id: uuid::Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            prefix: prefix.clone(),
            token_sha256: sha256_hex(&token),
            scope,
            revoked: false,
        };
        self.repo.insert_api_token(&record)?;
        Ok(IssuedToken {
            id: record.id,
            token,
        })
    }

    /// Look up an unrevoked token matching the presented plaintext.
    pub fn validate(&self, token: &str) -> Result<Option<ApiTokenRecord>, rusqlite::Error> {
        let Some(prefix) = token_prefix(token) else {
            return Ok(None);
        };
        let digest = sha256_hex(token);
        for candidate in self.repo.find_api_tokens_by_prefix(prefix)? {
            if candidate.token_sha256 == digest {
                self.repo.touch_api_token(&candidate.id)?;
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// Gate a request against a collection. Public collections allow
    /// anonymous reads; everything else needs a valid token owned by the
    /// collection's account with sufficient scope. Missing credentials
    /// get a challenge, bad ones a denial.
    pub fn authorize_collection(
        &self,
        headers: &HeaderMap,
        collection: &CollectionInfo,
        needed: TokenScope,
    ) -> Result<(), ApiError> {
        if collection.visibility == Visibility::Public && needed == TokenScope::Read {
            return Ok(());
        }
        let Some(presented) = extract_token(headers) else {
            return Err(ApiError::Unauthorized);
        };
        let Some(record) = self.validate(&presented)? else {
            return Err(ApiError::Forbidden);
        };
        if record.account_id != collection.account_id || !record.scope.allows(needed) {
            return Err(ApiError::Forbidden);
        }
        Ok(())
    }
}

fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

fn token_prefix(token: &str) -> Option<&str> {
    let rest = token.strip_prefix("skb_")?;
    let (prefix, _) = rest.split_once('_')?;
    (!prefix.is_empty()).then_some(prefix)
}

/// Pull a token out of Authorization: Bearer or Basic headers.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    if let Some(bearer) = value.strip_prefix("Bearer ") {
        return Some(bearer.trim().to_string());
    }
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    // Git sends the token as the password; some clients use the username.
    if pass.starts_with("skb_") {
        Some(pass.to_string())
    } else if user.starts_with("skb_") {
        Some(user.to_string())
    } else if !pass.is_empty() {
        Some(pass.to_string())
    } else {
        Some(user.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use axum::http::header::AUTHORIZATION;
    use rusqlite::Connection;

    fn service() -> (TokenService, String) {
        let conn = Connection::open_in_memory().unwrap();
        init_database(&conn).unwrap();
        let repo = CatalogRepo::new(conn);
        let account = repo.create_account("alice").unwrap();
        (TokenService::new(repo), account.id)
    }

    fn basic(user: &str, pass: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
        headers.insert(AUTHORIZATION, format!("Basic {encoded}").parse().unwrap());
        headers
    }

    #[test]
    fn test_issue_and_validate() {
        let (service, account_id) = service();
        let issued = service.issue(&account_id, TokenScope::Write).unwrap();
        assert!(issued.token.starts_with("skb_"));

        let record = service.validate(&issued.token).unwrap().unwrap();
        assert_eq!(record.account_id, account_id);
        assert_eq!(record.scope, TokenScope::Write);
    }

    #[test]
    fn test_validate_rejects_wrong_secret() {
        let (service, account_id) = service();
        let issued = service.issue(&account_id, TokenScope::Read).unwrap();
        let mut tampered = issued.token.clone();
        tampered.push('x');
        assert!(service.validate(&tampered).unwrap().is_none());
        assert!(service.validate("skb_nope_nope").unwrap().is_none());
        assert!(service.validate("garbage").unwrap().is_none());
    }

    #[test]
    fn test_revoked_token_fails() {
        let (service, account_id) = service();
        let issued = service.issue(&account_id, TokenScope::Read).unwrap();
        service.repo.revoke_api_token(&issued.id).unwrap();
        assert!(service.validate(&issued.token).unwrap().is_none());
    }

    #[test]
    fn test_token_extraction_slots() {
        let (service, account_id) = service();
        let issued = service.issue(&account_id, TokenScope::Read).unwrap();

        assert_eq!(
            extract_token(&basic("git", &issued.token)),
            Some(issued.token.clone())
        );
        assert_eq!(
            extract_token(&basic(&issued.token, "")),
            Some(issued.token.clone())
        );

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            format!("Bearer {}", issued.token).parse().unwrap(),
        );
        assert_eq!(extract_token(&headers), Some(issued.token));
    }

    #[test]
    fn test_private_collection_authorization() {
        let (service, account_id) = service();
        let collection = service
            .repo
            .create_collection(&account_id, "tools", Visibility::Private)
            .unwrap();
        let issued = service.issue(&account_id, TokenScope::Read).unwrap();

        // No credential: challenge.
        let err = service
            .authorize_collection(&HeaderMap::new(), &collection, TokenScope::Read)
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));

        // Bad credential: denial.
        let err = service
            .authorize_collection(&basic("git", "skb_bad_bad"), &collection, TokenScope::Read)
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden));

        // Valid read token on a read operation: allowed.
        service
            .authorize_collection(&basic("git", &issued.token), &collection, TokenScope::Read)
            .unwrap();

        // Read scope cannot write.
        let err = service
            .authorize_collection(&basic("git", &issued.token), &collection, TokenScope::Write)
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden));
    }

    #[test]
    fn test_public_collection_anonymous_read() {
        let (service, account_id) = service();
        let collection = service
            .repo
            .create_collection(&account_id, "tools", Visibility::Public)
            .unwrap();
        service
            .authorize_collection(&HeaderMap::new(), &collection, TokenScope::Read)
            .unwrap();
        // Writes still need a token.
        let err = service
            .authorize_collection(&HeaderMap::new(), &collection, TokenScope::Write)
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
    }
}
