use std::path::{Path, PathBuf};

use buildbridge_core::{EnvironmentVariables, EVENT_FILE_FLAG, EVENT_SOCKET_FLAG};

/// Where the external tool should publish its event stream for one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventStreamDestination {
    /// Append complete frames to this file
    File(PathBuf),
    /// Connect to this local socket and push frames
    Socket(PathBuf),
}

impl EventStreamDestination {
    fn as_flag(&self) -> String {
        match self {
            EventStreamDestination::File(path) => {
                format!("{}={}", EVENT_FILE_FLAG, path.display())
            }
            EventStreamDestination::Socket(path) => {
                format!("{}={}", EVENT_SOCKET_FLAG, path.display())
            }
        }
    }
}

/// One fully assembled tool invocation.
///
/// Argument order follows the tool's CLI conventions: verb, then flags, then
/// targets. The event-stream destination flag is only emitted when one was
/// requested.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    verb: String,
    flags: Vec<String>,
    targets: Vec<String>,
    environment: EnvironmentVariables,
    event_stream: Option<EventStreamDestination>,
}

impl ToolCommand {
    #[must_use]
    pub fn new(verb: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            flags: Vec::new(),
            targets: Vec::new(),
            environment: EnvironmentVariables::new(),
            event_stream: None,
        }
    }

    #[must_use]
    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.push(flag.into());
        self
    }

    #[must_use]
    pub fn with_flags(mut self, flags: impl IntoIterator<Item = String>) -> Self {
        self.flags.extend(flags);
        self
    }

    #[must_use]
    pub fn with_targets(mut self, targets: impl IntoIterator<Item = String>) -> Self {
        self.targets.extend(targets);
        self
    }

    #[must_use]
    pub fn with_environment(mut self, environment: EnvironmentVariables) -> Self {
        self.environment.merge(environment);
        self
    }

    /// Tell the tool where to publish its event stream
    #[must_use]
    pub fn with_event_stream(mut self, destination: EventStreamDestination) -> Self {
        self.event_stream = Some(destination);
        self
    }

    #[must_use]
    pub fn verb(&self) -> &str {
        &self.verb
    }

    #[must_use]
    pub fn environment(&self) -> &EnvironmentVariables {
        &self.environment
    }

    /// Assemble the argv tail (everything after the binary)
    #[must_use]
    pub fn to_args(&self, base_flags: &[String]) -> Vec<String> {
        let mut args = Vec::with_capacity(2 + base_flags.len() + self.flags.len() + self.targets.len());
        args.push(self.verb.clone());
        args.extend(base_flags.iter().cloned());
        if let Some(destination) = &self.event_stream {
            args.push(destination.as_flag());
        }
        args.extend(self.flags.iter().cloned());
        args.extend(self.targets.iter().cloned());
        args
    }
}

/// Render an invocation for log lines: `ENV=... binary verb flags targets`
#[must_use]
pub fn render_invocation(binary: &Path, args: &[String], environment: &EnvironmentVariables) -> String {
    let mut env_pairs: Vec<String> = environment
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    env_pairs.sort();
    let env_str = env_pairs.join(" ");
    if env_str.is_empty() {
        format!("{} {}", binary.display(), args.join(" "))
    } else {
        format!("{} {} {}", env_str, binary.display(), args.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_order_verb_flags_targets() {
        let command = ToolCommand::new("build")
            .with_event_stream(EventStreamDestination::File(PathBuf::from("/tmp/events")))
            .with_flag("--keep_going")
            .with_targets(vec!["//a:b".to_string(), "//c:d".to_string()]);
        let args = command.to_args(&["--color=yes".to_string()]);
        assert_eq!(
            args,
            vec![
                "build",
                "--color=yes",
                "--build_event_json_file=/tmp/events",
                "--keep_going",
                "//a:b",
                "//c:d",
            ]
        );
    }

    #[test]
    fn no_event_flag_without_destination() {
        let args = ToolCommand::new("test").to_args(&[]);
        assert_eq!(args, vec!["test"]);
    }

    #[test]
    fn invocation_rendering_includes_environment() {
        let mut env = EnvironmentVariables::new();
        env.insert("FOO", "bar");
        let rendered = render_invocation(
            Path::new("bazel"),
            &["build".to_string(), "//a:b".to_string()],
            &env,
        );
        assert_eq!(rendered, "FOO=bar bazel build //a:b");
    }
}
