//! Provisioning system credentials.

use log::debug;
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

pub const USERNAME_VAR: &str = "PS_USERNAME";
pub const PASSWORD_VAR: &str = "PS_PASSWORD";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Resolves credentials for provisioning host `ps_host`.
    ///
    /// Explicit arguments win, then the `PS_USERNAME`/`PS_PASSWORD`
    /// environment variables, then the host's `.netrc` entry.
    pub fn resolve(
        ps_host: &str,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Option<Self> {
        if let (Some(username), Some(password)) = (username, password) {
            return Some(Self::new(username, password));
        }
        if let (Ok(username), Ok(password)) = (env::var(USERNAME_VAR), env::var(PASSWORD_VAR)) {
            if !username.is_empty() && !password.is_empty() {
                return Some(Self::new(username, password));
            }
        }
        let path = netrc_path()?;
        let contents = fs::read_to_string(&path)
            .map_err(|e| debug!("unable to read {}: {e}", path.display()))
            .ok()?;
        netrc_lookup(&contents, ps_host)
    }

    fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

fn netrc_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os("NETRC") {
        return Some(PathBuf::from(path));
    }
    let home = env::var_os("HOME").or_else(|| env::var_os("USERPROFILE"))?;
    Some(Path::new(&home).join(".netrc"))
}

/// Finds `machine`'s login and password in netrc `contents`, falling
/// back to the `default` entry.
pub fn netrc_lookup(contents: &str, machine: &str) -> Option<Credentials> {
    #[derive(Default)]
    struct Entry<'a> {
        machine: Option<&'a str>,
        login: Option<&'a str>,
        password: Option<&'a str>,
    }

    let mut entries: Vec<Entry> = Vec::new();
    let mut tokens = contents.split_whitespace();
    while let Some(token) = tokens.next() {
        match token {
            "machine" => entries.push(Entry {
                machine: tokens.next(),
                ..Entry::default()
            }),
            "default" => entries.push(Entry::default()),
            "login" | "password" | "account" | "macdef" => {
                let value = tokens.next();
                if let Some(entry) = entries.last_mut() {
                    match token {
                        "login" => entry.login = value,
                        "password" => entry.password = value,
                        _ => (),
                    }
                }
            }
            _ => (),
        }
    }

    let credentials = |entry: &Entry| Some(Credentials::new(entry.login?, entry.password?));
    entries
        .iter()
        .find(|e| e.machine == Some(machine))
        .or_else(|| entries.iter().find(|e| e.machine.is_none()))
        .and_then(credentials)
}

/// Bearer tokens issued by the provisioning system.
#[derive(Debug, Clone)]
pub(crate) struct Tokens {
    pub access: String,
    pub refresh: String,
    pub expires: Instant,
}

impl Tokens {
    /// Tokens are treated as expired halfway through their lifetime.
    /// A lifetime that is not a representable duration expires at once.
    pub fn new(access: String, refresh: String, lifetime_s: f64) -> Self {
        let now = Instant::now();
        let expires = Duration::try_from_secs_f64(lifetime_s.max(0.0) / 2.0)
            .ok()
            .and_then(|half| now.checked_add(half))
            .unwrap_or(now);
        Self {
            access,
            refresh,
            expires,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires
    }
}

#[cfg(test)]
mod tests {
    use super::{netrc_lookup, Credentials, Tokens};

    const NETRC: &str = "
        machine urs.earthdata.nasa.gov login alice password s3cret
        machine ps.slideruleearth.io
            login bob
            password hunter2
        default login anon password guest
    ";

    #[test]
    fn test_netrc_machine() {
        assert_eq!(
            netrc_lookup(NETRC, "ps.slideruleearth.io"),
            Some(Credentials {
                username: "bob".into(),
                password: "hunter2".into()
            })
        );
        assert_eq!(
            netrc_lookup(NETRC, "urs.earthdata.nasa.gov").map(|c| c.username),
            Some("alice".into())
        );
    }

    #[test]
    fn test_netrc_default_and_missing() {
        assert_eq!(
            netrc_lookup(NETRC, "ps.example.org").map(|c| c.username),
            Some("anon".into())
        );
        assert_eq!(
            netrc_lookup("machine a login x password y", "b"),
            None
        );
    }

    #[test]
    fn test_explicit_credentials_win() {
        let creds = Credentials::resolve("ps.example.org", Some("me"), Some("pw")).unwrap();
        assert_eq!(creds.username, "me");
    }

    #[test]
    fn test_token_expiry() {
        assert!(Tokens::new("a".into(), "r".into(), 0.0).expires <= std::time::Instant::now());
        assert!(!Tokens::new("a".into(), "r".into(), 3600.0).is_expired());
    }

    #[test]
    fn test_unrepresentable_lifetime_expires() {
        let before = std::time::Instant::now();
        for lifetime in ["1e400".parse::<f64>().unwrap(), f64::NAN, 1e300] {
            let tokens = Tokens::new("a".into(), "r".into(), lifetime);
            assert!(tokens.expires >= before);
            assert!(tokens.expires <= std::time::Instant::now());
        }
    }
}
