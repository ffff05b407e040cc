//! The immutable description of what a slot should run.
use std::collections::HashMap;
use std::sync::Arc;

use handlebars::Handlebars;

use crate::error::Error;
use crate::options::{Options, Sink};

/// What to run and how, shared between every slot of a service.
///
/// Immutable once built; cloning is cheap (an `Arc` clone plus a small
/// context map), which is what [`Cmd::with_context_var`] relies on to hand
/// each slot its own `SLOT=<index>` variant without mutating the template.
#[derive(Clone)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    options: Arc<Options>,
    context: HashMap<String, String>,
}

impl std::fmt::Debug for Cmd {
    /// Redacts `extra_envs` and the injected context map: both can carry
    /// secrets (tokens passed as env vars), and `Cmd` ends up in status
    /// output and error messages.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cmd")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("context", &"<redacted>")
            .field("options", &self.options)
            .finish()
    }
}

impl Cmd {
    pub fn new(program: impl Into<String>, args: Vec<String>, options: Arc<Options>) -> Self {
        Cmd {
            program: program.into(),
            args,
            options,
            context: HashMap::new(),
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Return a copy of this `Cmd` with one additional template context
    /// variable set. Used by `ProcessSlot` to inject `SLOT=<index>`.
    pub fn with_context_var(&self, key: impl Into<String>, value: impl Into<String>) -> Cmd {
        let mut copy = self.clone();
        copy.context.insert(key.into(), value.into());
        copy
    }

    /// The environment a spawned process should see: the current process
    /// environment (unless `clean_env`), overlaid with `extra_envs`.
    pub fn envs(&self) -> HashMap<String, String> {
        let mut envs: HashMap<String, String> = if self.options.clean_env {
            HashMap::new()
        } else {
            std::env::vars().collect()
        };
        envs.extend(self.options.extra_envs.clone());
        envs
    }

    fn template_context(&self) -> HashMap<String, String> {
        let mut ctx = self.envs();
        ctx.extend(self.context.clone());
        ctx
    }

    fn render(&self, template: &str) -> Result<String, Error> {
        if !self.options.templating.is_enabled() {
            return Ok(template.to_string());
        }
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars
            .render_template(template, &self.template_context())
            .map_err(|err| Error::Templating(err.to_string()))
    }

    pub fn resolved_program(&self) -> Result<String, Error> {
        self.render(&self.program)
    }

    pub fn resolved_args(&self) -> Result<Vec<String>, Error> {
        self.args.iter().map(|arg| self.render(arg)).collect()
    }

    pub fn stdout_sink(&self) -> Result<Sink, Error> {
        Ok(self.render(&self.options.stdout)?.parse().expect("Sink::from_str is infallible"))
    }

    pub fn stderr_sink(&self) -> Result<Sink, Error> {
        Ok(self.render(&self.options.stderr)?.parse().expect("Sink::from_str is infallible"))
    }

    /// Best-effort human readable command line, shown in status output.
    /// Falls back to the unrendered template if rendering fails.
    pub fn command_line(&self) -> String {
        let program = self.resolved_program().unwrap_or_else(|_| self.program.clone());
        let args = self
            .resolved_args()
            .unwrap_or_else(|_| self.args.clone())
            .join(" ");
        if args.is_empty() {
            program
        } else {
            format!("{program} {args}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts_with_templating(on: bool) -> Arc<Options> {
        Arc::new(Options {
            templating: if on {
                crate::options::Templating::Handlebars
            } else {
                crate::options::Templating::Off
            },
            ..Options::default()
        })
    }

    #[test]
    fn renders_slot_context_variable() {
        let cmd = Cmd::new("echo", vec!["{{SLOT}}".to_string()], opts_with_templating(true))
            .with_context_var("SLOT", "3");
        assert_eq!(cmd.resolved_args().unwrap(), vec!["3".to_string()]);
    }

    #[test]
    fn templating_off_leaves_braces_untouched() {
        let cmd = Cmd::new("echo", vec!["{{SLOT}}".to_string()], opts_with_templating(false));
        assert_eq!(cmd.resolved_args().unwrap(), vec!["{{SLOT}}".to_string()]);
    }

    #[test]
    fn with_context_var_does_not_mutate_the_original() {
        let base = Cmd::new("sleep", vec!["1".into()], opts_with_templating(true));
        let derived = base.with_context_var("SLOT", "0");
        assert!(base.context.is_empty());
        assert_eq!(derived.context.get("SLOT"), Some(&"0".to_string()));
    }

    #[test]
    fn stdout_sink_parses_pipe() {
        let cmd = Cmd::new(
            "sleep",
            vec![],
            Arc::new(Options {
                stdout: "PIPE".into(),
                ..Options::default()
            }),
        );
        assert_eq!(cmd.stdout_sink().unwrap(), Sink::Pipe);
    }
}
