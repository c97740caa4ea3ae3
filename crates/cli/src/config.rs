use std::path::PathBuf;
use std::time::Duration;

use refguard_core::AssetPath;

use crate::confirm::ConfirmPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime configuration loaded from environment variables.
///
/// All fields have defaults suitable for running from a project root.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardConfig {
    /// Root of the asset tree (default: `.`).
    pub root: PathBuf,
    /// How often the scheduler is ticked while draining (default: 100 ms).
    pub tick: Duration,
    /// Give up waiting for deferred tasks after this long (default: 30 s).
    pub drain_timeout: Duration,
    /// How the cleanup question is answered (default: `prompt`).
    pub confirm: ConfirmPolicy,
    /// Composites treated as already open by the host.
    pub open_composites: Vec<AssetPath>,
    /// Log every lifecycle hook invocation (default: `false`).
    pub trace_hooks: bool,
    /// Run the gate again once cleanup has drained (default: `true`).
    pub reissue: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            tick: Duration::from_millis(100),
            drain_timeout: Duration::from_secs(30),
            confirm: ConfirmPolicy::Prompt,
            open_composites: Vec::new(),
            trace_hooks: false,
            reissue: true,
        }
    }
}

impl GuardConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                       | Default  |
    /// |-------------------------------|----------|
    /// | `REFGUARD_ROOT`               | `.`      |
    /// | `REFGUARD_TICK_MS`            | `100`    |
    /// | `REFGUARD_DRAIN_TIMEOUT_SECS` | `30`     |
    /// | `REFGUARD_CONFIRM`            | `prompt` |
    /// | `REFGUARD_OPEN_COMPOSITES`    | empty    |
    /// | `REFGUARD_TRACE_HOOKS`        | `false`  |
    /// | `REFGUARD_REISSUE`            | `true`   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let root = lookup("REFGUARD_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.root);

        let tick = match lookup("REFGUARD_TICK_MS") {
            Some(value) => Duration::from_millis(parse_positive("REFGUARD_TICK_MS", &value)?),
            None => defaults.tick,
        };

        let drain_timeout = match lookup("REFGUARD_DRAIN_TIMEOUT_SECS") {
            Some(value) => {
                Duration::from_secs(parse_positive("REFGUARD_DRAIN_TIMEOUT_SECS", &value)?)
            }
            None => defaults.drain_timeout,
        };

        let confirm = match lookup("REFGUARD_CONFIRM") {
            Some(value) => ConfirmPolicy::from_str(value.trim()).map_err(|reason| {
                ConfigError::Invalid {
                    var: "REFGUARD_CONFIRM",
                    value: value.clone(),
                    reason,
                }
            })?,
            None => defaults.confirm,
        };

        let open_composites = lookup("REFGUARD_OPEN_COMPOSITES")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(AssetPath::from)
            .collect();

        let trace_hooks = match lookup("REFGUARD_TRACE_HOOKS") {
            Some(value) => parse_bool("REFGUARD_TRACE_HOOKS", &value)?,
            None => defaults.trace_hooks,
        };

        let reissue = match lookup("REFGUARD_REISSUE") {
            Some(value) => parse_bool("REFGUARD_REISSUE", &value)?,
            None => defaults.reissue,
        };

        Ok(Self {
            root,
            tick,
            drain_timeout,
            confirm,
            open_composites,
            trace_hooks,
            reissue,
        })
    }
}

fn parse_positive(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    };
    let parsed: u64 = value
        .trim()
        .parse()
        .map_err(|_| invalid("expected a whole number"))?;
    if parsed == 0 {
        return Err(invalid("must be greater than zero"));
    }
    Ok(parsed)
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "expected true or false".into(),
        }),
    }
}
