//! Invocation context for the package-manager tool

use std::path::PathBuf;
use std::time::Duration;

use helmgate_core::{CommandResult, CommandRunner, CommandSpec, Layout, Settings, exec};

use crate::error::Result;

/// Everything needed to build and run a tool command line
#[derive(Debug, Clone)]
pub struct HelmTool {
    binary: String,
    wrapper: Vec<String>,
    layout: Layout,
    timeout: Duration,
    kubeconfig: Option<PathBuf>,
    runner: CommandRunner,
}

impl HelmTool {
    pub fn new(binary: impl Into<String>, layout: Layout) -> Self {
        Self {
            binary: binary.into(),
            wrapper: Vec::new(),
            layout,
            timeout: exec::DEFAULT_TIMEOUT,
            kubeconfig: None,
            runner: CommandRunner::default(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            binary: settings.helm_binary.clone(),
            wrapper: settings.helm_wrapper.clone(),
            layout: settings.layout(),
            timeout: settings.command_timeout,
            kubeconfig: settings.kubeconfig.clone(),
            runner: CommandRunner::new(settings.pool),
        }
    }

    /// Launch the binary through `wrapper` (argv prefix)
    pub fn with_wrapper(mut self, wrapper: Vec<String>) -> Self {
        self.wrapper = wrapper;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_kubeconfig(mut self, kubeconfig: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(kubeconfig.into());
        self
    }

    pub fn with_runner(mut self, runner: CommandRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// A command line for the tool with the layout environment applied
    pub fn command<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let spec = match self.wrapper.split_first() {
            Some((program, rest)) => CommandSpec::new(program.clone())
                .args(rest.iter().cloned())
                .arg(self.binary.clone()),
            None => CommandSpec::new(self.binary.clone()),
        };

        let mut spec = spec
            .args(args)
            .envs(self.layout.helm_env())
            .current_dir(self.layout.root())
            .timeout(self.timeout);
        if let Some(kubeconfig) = &self.kubeconfig {
            spec = spec.env("KUBECONFIG", kubeconfig.to_string_lossy());
        }
        spec
    }

    /// Run a tool command and apply the success rule (exit 0, no errors on stderr)
    pub async fn run(&self, spec: &CommandSpec) -> Result<CommandResult> {
        // The tool runs from the layout root and writes into its homes
        self.layout.ensure()?;
        let result = self.runner.execute(spec).await?;
        Ok(result.check_stderr(&self.binary)?)
    }
}
