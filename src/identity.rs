use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fs;
use std::path::PathBuf;
use tracing::warn;

/// Stable per-install identity token, used by the backend to correlate a
/// conversation. Persisted as a single line under the user config dir.
///
/// Storage trouble never reaches the turn path: if the token cannot be
/// written we keep serving an in-memory one and retry the write on the
/// next read.
pub struct IdentityStore {
    path: PathBuf,
    cached: Option<String>,
    persisted: bool,
}

impl IdentityStore {
    pub fn new() -> Self {
        let path = dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("fuelagent")
            .join("user_id");
        Self::at(path)
    }

    pub fn at(path: PathBuf) -> Self {
        Self {
            path,
            cached: None,
            persisted: false,
        }
    }

    /// Read the persisted token, generating and persisting one first if
    /// this install has none yet. Stable across calls within a session.
    pub fn get_or_create(&mut self) -> String {
        if let Some(id) = self.cached.clone() {
            if !self.persisted {
                self.persisted = self.write(&id);
            }
            return id;
        }

        if let Ok(contents) = fs::read_to_string(&self.path) {
            let id = contents.trim().to_string();
            if !id.is_empty() {
                self.cached = Some(id.clone());
                self.persisted = true;
                return id;
            }
        }

        let id = generate();
        self.persisted = self.write(&id);
        self.cached = Some(id.clone());
        id
    }

    /// Discard the current token and mint a new one ("new chat").
    pub fn reset(&mut self) -> String {
        let id = generate();
        self.persisted = self.write(&id);
        self.cached = Some(id.clone());
        id
    }

    fn write(&self, id: &str) -> bool {
        let result = self
            .path
            .parent()
            .map(fs::create_dir_all)
            .unwrap_or(Ok(()))
            .and_then(|_| fs::write(&self.path, id));
        match result {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, path = %self.path.display(), "could not persist identity, keeping it in memory");
                false
            }
        }
    }
}

/// Time-seeded token with a random suffix: unique enough for a
/// correlation key, deliberately not cryptographic.
fn generate() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("user_{}_{}", to_base36(chrono::Utc::now().timestamp_millis() as u64), suffix)
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn same_value_twice_within_a_session() {
        let dir = tempdir().unwrap();
        let mut store = IdentityStore::at(dir.path().join("user_id"));
        let first = store.get_or_create();
        let second = store.get_or_create();
        assert_eq!(first, second);
        assert!(first.starts_with("user_"));
    }

    #[test]
    fn survives_across_store_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("user_id");

        let first = IdentityStore::at(path.clone()).get_or_create();
        let second = IdentityStore::at(path).get_or_create();
        assert_eq!(first, second);
    }

    #[test]
    fn reset_mints_a_different_token() {
        let dir = tempdir().unwrap();
        let mut store = IdentityStore::at(dir.path().join("user_id"));
        let old = store.get_or_create();
        let new = store.reset();
        assert_ne!(old, new);
        assert_eq!(store.get_or_create(), new);
    }

    #[test]
    fn unwritable_storage_falls_back_to_memory() {
        let dir = tempdir().unwrap();
        // Parent "blocker" is a file, so creating the directory under it fails.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();

        let mut store = IdentityStore::at(blocker.join("nested").join("user_id"));
        let first = store.get_or_create();
        let second = store.get_or_create();
        assert_eq!(first, second);
        assert!(first.starts_with("user_"));
    }

    #[test]
    fn generated_tokens_do_not_collide_casually() {
        let a = generate();
        let b = generate();
        assert_ne!(a, b);
    }
}
