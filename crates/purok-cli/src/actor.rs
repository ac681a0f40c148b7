//! Actor identity resolution for CLI commands.
//!
//! Identity chain: `--actor` flag > `PUROK_ACTOR` env > `USER` env (TTY only).
//! Role chain: `--role` flag > `PUROK_ROLE` env > resident.
//!
//! Mutating commands require an identity; read-only commands work without one.

use std::env;

use purok_core::{Actor, Role};

/// Errors from actor resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorResolutionError {
    pub message: String,
    pub code: &'static str,
}

impl std::fmt::Display for ActorResolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ActorResolutionError {}

trait EnvReader {
    fn get(&self, key: &str) -> Option<String>;
    fn is_tty(&self) -> bool;
}

struct RealEnv;

impl EnvReader for RealEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.trim().is_empty())
    }

    fn is_tty(&self) -> bool {
        use std::io::IsTerminal;
        std::io::stdin().is_terminal()
    }
}

fn resolve_id_with(cli_flag: Option<&str>, env: &dyn EnvReader) -> Option<String> {
    if let Some(id) = cli_flag.map(str::trim).filter(|id| !id.is_empty()) {
        return Some(id.to_string());
    }

    if let Some(val) = env.get("PUROK_ACTOR") {
        return Some(val.trim().to_string());
    }

    if env.is_tty() {
        return env.get("USER");
    }

    None
}

fn resolve_role_with(
    cli_flag: Option<Role>,
    env: &dyn EnvReader,
) -> Result<Role, ActorResolutionError> {
    if let Some(role) = cli_flag {
        return Ok(role);
    }

    env.get("PUROK_ROLE").map_or(Ok(Role::Resident), |raw| {
        raw.parse().map_err(|err| ActorResolutionError {
            message: format!("PUROK_ROLE: {err}"),
            code: "invalid_role",
        })
    })
}

fn require_actor_with(
    id_flag: Option<&str>,
    role_flag: Option<Role>,
    env: &dyn EnvReader,
) -> Result<Actor, ActorResolutionError> {
    let id = resolve_id_with(id_flag, env).ok_or_else(|| ActorResolutionError {
        message: "Actor identity required for this command. \
                  Set --actor or the PUROK_ACTOR environment variable."
            .to_string(),
        code: "missing_actor",
    })?;
    let role = resolve_role_with(role_flag, env)?;
    Ok(Actor::new(id, role))
}

/// Resolve the acting identity for a mutating command.
///
/// # Errors
///
/// Returns an error when no identity can be found or `PUROK_ROLE` is not a
/// known role.
pub fn require_actor(
    id_flag: Option<&str>,
    role_flag: Option<Role>,
) -> Result<Actor, ActorResolutionError> {
    require_actor_with(id_flag, role_flag, &RealEnv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MockEnv {
        vars: HashMap<String, String>,
        tty: bool,
    }

    impl MockEnv {
        fn new() -> Self {
            Self {
                vars: HashMap::new(),
                tty: false,
            }
        }

        fn var(mut self, key: &str, val: &str) -> Self {
            self.vars.insert(key.to_string(), val.to_string());
            self
        }

        const fn tty(mut self) -> Self {
            self.tty = true;
            self
        }
    }

    impl EnvReader for MockEnv {
        fn get(&self, key: &str) -> Option<String> {
            self.vars.get(key).filter(|v| !v.trim().is_empty()).cloned()
        }

        fn is_tty(&self) -> bool {
            self.tty
        }
    }

    #[test]
    fn flag_takes_priority() {
        let env = MockEnv::new().var("PUROK_ACTOR", "env-actor").var("PUROK_ROLE", "official");
        let actor = require_actor_with(Some("flag-actor"), Some(Role::Collector), &env)
            .expect("resolved");
        assert_eq!(actor, Actor::new("flag-actor", Role::Collector));
    }

    #[test]
    fn env_fallback() {
        let env = MockEnv::new().var("PUROK_ACTOR", "kagawad-lito").var("PUROK_ROLE", "Official");
        let actor = require_actor_with(None, None, &env).expect("resolved");
        assert_eq!(actor, Actor::official("kagawad-lito"));
    }

    #[test]
    fn blank_flag_ignored() {
        let env = MockEnv::new().var("PUROK_ACTOR", "env-actor");
        assert_eq!(resolve_id_with(Some("  "), &env).as_deref(), Some("env-actor"));
    }

    #[test]
    fn role_defaults_to_resident() {
        let env = MockEnv::new().var("PUROK_ACTOR", "maria");
        let actor = require_actor_with(None, None, &env).expect("resolved");
        assert_eq!(actor.role, Role::Resident);
    }

    #[test]
    fn user_env_only_in_tty() {
        let env = MockEnv::new().var("USER", "bob");
        assert_eq!(resolve_id_with(None, &env), None);

        let env = MockEnv::new().var("USER", "bob").tty();
        assert_eq!(resolve_id_with(None, &env).as_deref(), Some("bob"));
    }

    #[test]
    fn missing_identity_is_an_error() {
        let err = require_actor_with(None, Some(Role::Official), &MockEnv::new())
            .expect_err("no identity");
        assert_eq!(err.code, "missing_actor");
        assert!(err.to_string().contains("PUROK_ACTOR"));
    }

    #[test]
    fn unknown_role_is_an_error() {
        let env = MockEnv::new().var("PUROK_ACTOR", "maria").var("PUROK_ROLE", "mayor");
        let err = require_actor_with(None, None, &env).expect_err("bad role");
        assert_eq!(err.code, "invalid_role");
    }
}
