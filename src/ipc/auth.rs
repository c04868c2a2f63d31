// SPDX-License-Identifier: MIT

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Resolves a presented credential to a user identity.
///
/// Identity issuance lives outside the daemon; this seam is the only place
/// the server trusts. `verify` returns the user id for a valid token and
/// `None` otherwise.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Option<String>;
}

/// Token-file verifier backed by `{data_dir}/user_tokens`.
///
/// One `<token> <user_id>` pair per line, `#` comments allowed. The file is
/// written with user-only permissions (mode 0600 on Unix) — it is the only
/// credential protecting the local WebSocket port from other processes on
/// the same machine. The file is re-read on every verify so `token add`
/// takes effect without a daemon restart.
pub struct FileTokenVerifier {
    path: PathBuf,
}

impl FileTokenVerifier {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: token_file_path(data_dir),
        }
    }
}

#[async_trait]
impl IdentityVerifier for FileTokenVerifier {
    async fn verify(&self, token: &str) -> Option<String> {
        let contents = tokio::fs::read_to_string(&self.path).await.ok()?;
        lookup_token(&contents, token)
    }
}

fn token_file_path(data_dir: &Path) -> PathBuf {
    data_dir.join("user_tokens")
}

fn lookup_token(contents: &str, token: &str) -> Option<String> {
    if token.is_empty() {
        return None;
    }
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        if let (Some(t), Some(user)) = (parts.next(), parts.next()) {
            if t == token {
                return Some(user.to_string());
            }
        }
    }
    None
}

/// Mint a new token for `user_id` and append it to the token file.
///
/// Generates a random 32-character hex token (UUID v4 without dashes),
/// creating the file with mode 0600 on first use. Returns the token for
/// display; it is never logged.
pub fn mint_token(data_dir: &Path, user_id: &str) -> Result<String> {
    let path = token_file_path(data_dir);
    std::fs::create_dir_all(data_dir)?;

    let token = Uuid::new_v4().to_string().replace('-', "");
    let mut contents = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e).context("failed to read token file"),
    };
    if !contents.is_empty() && !contents.ends_with('\n') {
        contents.push('\n');
    }
    contents.push_str(&format!("{token} {user_id}\n"));
    std::fs::write(&path, contents)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(token)
}

/// List `(user_id, token_prefix)` pairs from the token file without exposing
/// full tokens.
pub fn list_tokens(data_dir: &Path) -> Result<Vec<(String, String)>> {
    let path = token_file_path(data_dir);
    let contents = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).context("failed to read token file"),
    };
    let mut entries = Vec::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        if let (Some(token), Some(user)) = (parts.next(), parts.next()) {
            let prefix = token.chars().take(8).collect::<String>();
            entries.push((user.to_string(), format!("{prefix}…")));
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn mint_then_verify_round_trip() {
        let dir = TempDir::new().unwrap();
        let token = mint_token(dir.path(), "u-alice").unwrap();
        assert_eq!(token.len(), 32);

        let verifier = FileTokenVerifier::new(dir.path());
        assert_eq!(verifier.verify(&token).await.as_deref(), Some("u-alice"));
        assert_eq!(verifier.verify("wrong").await, None);
        assert_eq!(verifier.verify("").await, None);
    }

    #[tokio::test]
    async fn multiple_tokens_resolve_independently() {
        let dir = TempDir::new().unwrap();
        let t_a = mint_token(dir.path(), "u-a").unwrap();
        let t_b = mint_token(dir.path(), "u-b").unwrap();

        let verifier = FileTokenVerifier::new(dir.path());
        assert_eq!(verifier.verify(&t_a).await.as_deref(), Some("u-a"));
        assert_eq!(verifier.verify(&t_b).await.as_deref(), Some("u-b"));

        let listed = list_tokens(dir.path()).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].0, "u-a");
        // Prefixes never expose the whole token.
        assert!(listed[0].1.len() < t_a.len());
    }

    #[tokio::test]
    async fn missing_file_verifies_nothing() {
        let dir = TempDir::new().unwrap();
        let verifier = FileTokenVerifier::new(dir.path());
        assert_eq!(verifier.verify("anything").await, None);
        assert!(list_tokens(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let contents = "# issued 2025-01-01\n\nabc123 u-a\n";
        assert_eq!(lookup_token(contents, "abc123").as_deref(), Some("u-a"));
        assert_eq!(lookup_token(contents, "#"), None);
    }

    #[cfg(unix)]
    #[test]
    fn token_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        mint_token(dir.path(), "u-a").unwrap();
        let mode = std::fs::metadata(dir.path().join("user_tokens"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
