//! Immutable per-service configuration.
//!
//! A single unified schema, per the resolved "two versions of Cmd/Options"
//! open question: everything a service needs to know about how to run and
//! supervise its command lives here, deserializable straight from the JSON
//! body of `POST /services/add` with field-level defaults so a caller may
//! omit any subset of them.
use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_smart_stop_signal() -> i32 {
    15
}

fn default_smart_stop_timeout() -> f64 {
    5.0
}

fn default_waiting_for_restart_delay() -> f64 {
    1.0
}

fn default_stdout() -> String {
    "NULL".to_string()
}

fn default_stderr() -> String {
    "STDOUT".to_string()
}

fn default_stdxxx_rotation_size() -> u64 {
    100 * 1024 * 1024
}

fn default_stdxxx_rotation_time() -> u64 {
    86_400
}

/// How stdout/stderr file sinks are written.
///
/// `Auto` picks the cheap in-process path (`Sink::Null`) whenever both sinks
/// are among `{NULL, STDOUT, PIPE}`; as soon as either sink names a real file
/// it delegates to the rotating external wrapper.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum StdxxxHandler {
    #[default]
    Auto,
    External,
}

/// Whether `Cmd`'s program/args/sinks are rendered as handlebars templates
/// against the process environment (plus any injected context, e.g. `SLOT`).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Templating {
    #[default]
    Handlebars,
    Off,
}

impl Templating {
    pub fn is_enabled(self) -> bool {
        matches!(self, Templating::Handlebars)
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Options {
    #[serde(default = "default_true")]
    pub smart_stop: bool,
    #[serde(default = "default_smart_stop_signal")]
    pub smart_stop_signal: i32,
    #[serde(default = "default_smart_stop_timeout")]
    pub smart_stop_timeout: f64,
    #[serde(default = "default_waiting_for_restart_delay")]
    pub waiting_for_restart_delay: f64,
    #[serde(default = "default_true")]
    pub autorespawn: bool,
    #[serde(default = "default_true")]
    pub autostart: bool,
    #[serde(default = "default_true")]
    pub recursive_sigkill: bool,
    #[serde(default = "default_stdout")]
    pub stdout: String,
    #[serde(default = "default_stderr")]
    pub stderr: String,
    #[serde(default)]
    pub stdxxx_handler: StdxxxHandler,
    #[serde(default = "default_stdxxx_rotation_size")]
    pub stdxxx_rotation_size: u64,
    #[serde(default = "default_stdxxx_rotation_time")]
    pub stdxxx_rotation_time: u64,
    #[serde(default)]
    pub clean_env: bool,
    #[serde(default)]
    pub extra_envs: HashMap<String, String>,
    #[serde(default)]
    pub templating: Templating,
}

impl std::fmt::Debug for Options {
    /// `extra_envs` is excluded: it routinely carries secrets handed to the
    /// child process and Options ends up echoed back in HTTP responses.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("smart_stop", &self.smart_stop)
            .field("smart_stop_signal", &self.smart_stop_signal)
            .field("smart_stop_timeout", &self.smart_stop_timeout)
            .field("waiting_for_restart_delay", &self.waiting_for_restart_delay)
            .field("autorespawn", &self.autorespawn)
            .field("autostart", &self.autostart)
            .field("recursive_sigkill", &self.recursive_sigkill)
            .field("stdout", &self.stdout)
            .field("stderr", &self.stderr)
            .field("stdxxx_handler", &self.stdxxx_handler)
            .field("clean_env", &self.clean_env)
            .field("extra_envs", &"<redacted>")
            .field("templating", &self.templating)
            .finish()
    }
}

impl Default for Options {
    fn default() -> Self {
        Options {
            smart_stop: true,
            smart_stop_signal: default_smart_stop_signal(),
            smart_stop_timeout: default_smart_stop_timeout(),
            waiting_for_restart_delay: default_waiting_for_restart_delay(),
            autorespawn: true,
            autostart: true,
            recursive_sigkill: true,
            stdout: default_stdout(),
            stderr: default_stderr(),
            stdxxx_handler: StdxxxHandler::default(),
            stdxxx_rotation_size: default_stdxxx_rotation_size(),
            stdxxx_rotation_time: default_stdxxx_rotation_time(),
            clean_env: false,
            extra_envs: HashMap::new(),
            templating: Templating::default(),
        }
    }
}

/// A resolved output sink, parsed from one of `Options::stdout` / `Options::stderr`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Sink {
    Null,
    /// Only meaningful for stderr: merge into whatever stdout resolved to.
    Stdout,
    Pipe,
    File(std::path::PathBuf),
}

impl Sink {
    /// Inverse of `FromStr`, used to hand a resolved sink to the external
    /// log wrapper as a command-line argument.
    pub fn as_wrapper_arg(&self) -> String {
        match self {
            Sink::Null => "NULL".to_string(),
            Sink::Stdout => "STDOUT".to_string(),
            Sink::Pipe => "PIPE".to_string(),
            Sink::File(path) => path.display().to_string(),
        }
    }
}

impl FromStr for Sink {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "NULL" => Sink::Null,
            "STDOUT" => Sink::Stdout,
            "PIPE" => Sink::Pipe,
            path => Sink::File(std::path::PathBuf::from(shellexpand::tilde(path).as_ref())),
        })
    }
}

impl Options {
    /// Whether the `AUTO` handler would resolve to the cheap in-process path
    /// (both sinks among `{NULL, STDOUT, PIPE}`) for the given resolved sinks.
    pub fn auto_handler_is_inprocess(stdout: &Sink, stderr: &Sink) -> bool {
        let inprocess = |s: &Sink| matches!(s, Sink::Null | Sink::Stdout | Sink::Pipe);
        inprocess(stdout) && inprocess(stderr)
    }

    /// Whether the configured handler needs the external rotating-file wrapper
    /// for the given resolved sinks.
    pub fn needs_external_wrapper(&self, stdout: &Sink, stderr: &Sink) -> bool {
        match self.stdxxx_handler {
            StdxxxHandler::External => true,
            StdxxxHandler::Auto => !Self::auto_handler_is_inprocess(stdout, stderr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_table() {
        let opts = Options::default();
        assert!(opts.smart_stop);
        assert_eq!(opts.smart_stop_signal, 15);
        assert_eq!(opts.smart_stop_timeout, 5.0);
        assert_eq!(opts.waiting_for_restart_delay, 1.0);
        assert!(opts.autorespawn);
        assert!(opts.autostart);
        assert!(opts.recursive_sigkill);
        assert_eq!(opts.stdout, "NULL");
        assert_eq!(opts.stderr, "STDOUT");
        assert!(!opts.clean_env);
        assert!(opts.extra_envs.is_empty());
    }

    #[test]
    fn json_body_may_omit_every_field() {
        let opts: Options = serde_json::from_str("{}").unwrap();
        assert_eq!(opts, Options::default());
    }

    #[test]
    fn sink_parses_special_values_and_falls_back_to_path() {
        assert_eq!("NULL".parse::<Sink>().unwrap(), Sink::Null);
        assert_eq!("PIPE".parse::<Sink>().unwrap(), Sink::Pipe);
        assert_eq!("STDOUT".parse::<Sink>().unwrap(), Sink::Stdout);
        assert_eq!(
            "/var/log/foo.log".parse::<Sink>().unwrap(),
            Sink::File(std::path::PathBuf::from("/var/log/foo.log"))
        );
    }

    #[test]
    fn auto_handler_stays_inprocess_for_null_stdout_pipe() {
        assert!(Options::auto_handler_is_inprocess(&Sink::Null, &Sink::Stdout));
        assert!(!Options::auto_handler_is_inprocess(
            &Sink::File("x.log".into()),
            &Sink::Stdout
        ));
    }
}
