#[cfg(target_family = "unix")]
mod unix;

#[cfg(target_family = "unix")]
pub use self::unix::{raise_nofile, rlim_t};

use std::sync::OnceLock;

#[cfg(target_family = "unix")]
use rama::telemetry::tracing;

/// Host name of this machine, resolved once per process.
///
/// Falls back to `localhost` when the name cannot be resolved,
/// which is always the case on non-unix targets.
pub fn hostname() -> &'static str {
    static HOSTNAME: OnceLock<String> = OnceLock::new();
    HOSTNAME.get_or_init(|| {
        resolve_hostname()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "localhost".to_owned())
    })
}

#[cfg(target_family = "unix")]
fn resolve_hostname() -> Option<String> {
    match nix::unistd::gethostname() {
        Ok(name) => match name.into_string() {
            Ok(name) => Some(name),
            Err(name) => {
                tracing::debug!(?name, "hostname is not valid utf-8");
                None
            }
        },
        Err(err) => {
            tracing::debug!("gethostname failed: {err}");
            None
        }
    }
}

#[cfg(not(target_family = "unix"))]
fn resolve_hostname() -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_is_never_empty() {
        assert!(!hostname().is_empty());
        assert_eq!(hostname(), hostname());
    }

    #[cfg(target_family = "unix")]
    #[test]
    fn hostname_is_the_system_name() {
        let name = nix::unistd::gethostname().unwrap();
        let name = name.to_str().unwrap();
        if !name.is_empty() {
            assert_eq!(name, hostname());
        }
    }
}
