//! Command records and the command registry.
//!
//! A command is one concrete record: name, aliases, option schema, an async
//! handler, and an optional proto type. The registry resolves names through
//! a prefix tree (any unambiguous prefix works) and maps proto types to
//! commands so typed messages can invoke them.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::future::Future;
use std::pin::Pin;

use screenlink_types::{Message, MessageType};

use crate::error::CoreError;
use crate::trie::{Resolution, Trie};

pub type CommandFuture = Pin<Box<dyn Future<Output = Result<String, CoreError>> + Send>>;
pub type CommandHandler = Box<dyn FnMut(CommandCall) -> CommandFuture + Send>;

/// Scalar kinds an option accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Flag,
    Int,
    Double,
    Text,
}

#[derive(Debug, Clone)]
pub struct OptionSpec {
    pub name: String,
    pub kind: OptionKind,
    pub help: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Flag(bool),
    Int(i64),
    Double(f64),
    Text(String),
}

/// Parsed invocation handed to a command handler.
#[derive(Debug, Default, Clone)]
pub struct CommandCall {
    pub options: HashMap<String, OptionValue>,
    pub positionals: Vec<String>,
    /// Set when the command was invoked by a proto-typed message.
    pub message: Option<Message>,
}

impl CommandCall {
    #[must_use]
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.options.get(name), Some(OptionValue::Flag(true)))
    }

    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.options.get(name) {
            Some(OptionValue::Text(value)) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn int(&self, name: &str) -> Option<i64> {
        match self.options.get(name) {
            Some(OptionValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn double(&self, name: &str) -> Option<f64> {
        match self.options.get(name) {
            Some(OptionValue::Double(value)) => Some(*value),
            _ => None,
        }
    }
}

/// One registered command.
pub struct Command {
    pub name: String,
    pub aliases: Vec<String>,
    pub summary: String,
    pub options: Vec<OptionSpec>,
    pub proto_type: Option<MessageType>,
    /// Owning module, for bulk uninstall.
    pub module: String,
    handler: CommandHandler,
}

impl Command {
    pub fn new(name: &str, summary: &str, module: &str, handler: CommandHandler) -> Self {
        Self {
            name: name.to_string(),
            aliases: Vec::new(),
            summary: summary.to_string(),
            options: Vec::new(),
            proto_type: None,
            module: module.to_string(),
            handler,
        }
    }

    #[must_use]
    pub fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_string());
        self
    }

    #[must_use]
    pub fn option(mut self, name: &str, kind: OptionKind, help: &str) -> Self {
        self.options.push(OptionSpec {
            name: name.to_string(),
            kind,
            help: help.to_string(),
        });
        self
    }

    #[must_use]
    pub fn proto(mut self, ty: MessageType) -> Self {
        self.proto_type = Some(ty);
        self
    }

    /// Parse an argument vector against this command's option schema.
    pub fn parse_options(&self, args: &[String]) -> Result<CommandCall, CoreError> {
        let mut call = CommandCall::default();
        let mut iter = args.iter().peekable();
        while let Some(token) = iter.next() {
            let Some(stripped) = token.strip_prefix("--") else {
                call.positionals.push(token.clone());
                continue;
            };
            let (name, inline_value) = match stripped.split_once('=') {
                Some((name, value)) => (name, Some(value.to_string())),
                None => (stripped, None),
            };
            let Some(spec) = self.options.iter().find(|spec| spec.name == name) else {
                return Err(CoreError::Command(format!(
                    "unknown option --{name} for {}",
                    self.name
                )));
            };
            let raw = match (inline_value, spec.kind) {
                (Some(value), _) => Some(value),
                (None, OptionKind::Flag) => None,
                (None, _) => match iter.peek() {
                    Some(next) if !next.starts_with("--") => iter.next().cloned(),
                    _ => {
                        return Err(CoreError::Command(format!(
                            "option --{name} needs a value"
                        )));
                    }
                },
            };
            let value = parse_value(spec, raw.as_deref())?;
            call.options.insert(spec.name.clone(), value);
        }
        Ok(call)
    }

    /// One help block: usage line plus option descriptions.
    #[must_use]
    pub fn help(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, "{}", self.name);
        if !self.aliases.is_empty() {
            let _ = write!(out, " ({})", self.aliases.join(", "));
        }
        let _ = writeln!(out, " - {}", self.summary);
        for spec in &self.options {
            let kind = match spec.kind {
                OptionKind::Flag => "",
                OptionKind::Int => "=<int>",
                OptionKind::Double => "=<float>",
                OptionKind::Text => "=<value>",
            };
            let _ = writeln!(out, "  --{}{kind}  {}", spec.name, spec.help);
        }
        out
    }
}

fn parse_value(spec: &OptionSpec, raw: Option<&str>) -> Result<OptionValue, CoreError> {
    match spec.kind {
        OptionKind::Flag => {
            let flag = match raw {
                None => true,
                Some("true" | "1") => true,
                Some("false" | "0") => false,
                Some(other) => {
                    return Err(CoreError::Command(format!(
                        "option --{} expects a boolean, got {other}",
                        spec.name
                    )));
                }
            };
            Ok(OptionValue::Flag(flag))
        }
        OptionKind::Int => {
            let raw = raw.unwrap_or_default();
            raw.parse()
                .map(OptionValue::Int)
                .map_err(|_| CoreError::Command(format!("option --{} expects an integer, got {raw}", spec.name)))
        }
        OptionKind::Double => {
            let raw = raw.unwrap_or_default();
            raw.parse()
                .map(OptionValue::Double)
                .map_err(|_| CoreError::Command(format!("option --{} expects a number, got {raw}", spec.name)))
        }
        OptionKind::Text => Ok(OptionValue::Text(raw.unwrap_or_default().to_string())),
    }
}

/// Name-keyed command store with prefix resolution and proto dispatch.
#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Command>,
    /// Names and aliases -> canonical name.
    lookup: Trie<String>,
    proto: HashMap<MessageType, String>,
}

impl CommandRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command under its name and aliases.
    pub fn register(&mut self, command: Command) -> Result<(), CoreError> {
        if self.lookup.get(&command.name).is_some() {
            return Err(CoreError::Command(format!(
                "command {} already registered",
                command.name
            )));
        }
        for alias in &command.aliases {
            if self.lookup.get(alias).is_some() {
                return Err(CoreError::Command(format!("alias {alias} already taken")));
            }
        }
        self.lookup
            .insert(&command.name, command.name.clone());
        for alias in &command.aliases {
            self.lookup.insert(alias, command.name.clone());
        }
        if let Some(ty) = command.proto_type {
            self.proto.insert(ty, command.name.clone());
        }
        self.commands.insert(command.name.clone(), command);
        Ok(())
    }

    /// Remove every command a module registered.
    pub fn uninstall_module(&mut self, module: &str) {
        let doomed: Vec<String> = self
            .commands
            .values()
            .filter(|command| command.module == module)
            .map(|command| command.name.clone())
            .collect();
        for name in doomed {
            if let Some(command) = self.commands.remove(&name) {
                self.lookup.remove(&command.name);
                for alias in &command.aliases {
                    self.lookup.remove(alias);
                }
                if let Some(ty) = command.proto_type {
                    self.proto.remove(&ty);
                }
            }
        }
    }

    /// Resolve a possibly-abbreviated command name.
    pub fn resolve(&self, input: &str) -> Result<String, CoreError> {
        match self.lookup.resolve(input) {
            Resolution::Unique(_, canonical) => Ok(canonical),
            Resolution::Ambiguous(keys) => Err(CoreError::AmbiguousCommand {
                input: input.to_string(),
                candidates: keys,
            }),
            Resolution::NotFound => Err(CoreError::UnknownCommand(input.to_string())),
        }
    }

    /// Parse a command line and return the handler's future. The future is
    /// detached from the registry so the caller can drop its lock first.
    pub fn invoke_line(&mut self, line: &str) -> Result<CommandFuture, CoreError> {
        let tokens: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        let Some((head, rest)) = tokens.split_first() else {
            return Err(CoreError::Command("empty command".to_string()));
        };
        let canonical = self.resolve(head)?;
        let command = self
            .commands
            .get_mut(&canonical)
            .ok_or_else(|| CoreError::UnknownCommand(canonical.clone()))?;
        let call = command.parse_options(rest)?;
        Ok((command.handler)(call))
    }

    /// Invoke the command registered for a message's proto type, if any.
    pub fn invoke_message(&mut self, msg: &Message) -> Option<CommandFuture> {
        let canonical = self.proto.get(&msg.message_type())?.clone();
        let command = self.commands.get_mut(&canonical)?;
        let call = CommandCall {
            message: Some(msg.clone()),
            ..CommandCall::default()
        };
        Some((command.handler)(call))
    }

    /// Proto types currently mapped to commands.
    #[must_use]
    pub fn proto_types(&self) -> Vec<MessageType> {
        self.proto.keys().copied().collect()
    }

    /// Help text for all commands, or only the named ones.
    #[must_use]
    pub fn help(&self, filter: &[String]) -> String {
        let mut names: Vec<&String> = self
            .commands
            .keys()
            .filter(|name| filter.is_empty() || filter.contains(name))
            .collect();
        names.sort();
        let mut out = String::new();
        for name in names {
            out.push_str(&self.commands[name].help());
        }
        if out.is_empty() {
            out.push_str("no matching commands\n");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(name: &str, module: &str) -> Command {
        Command::new(
            name,
            "test command",
            module,
            Box::new(|_call| Box::pin(async { Ok(String::from("done")) })),
        )
    }

    #[tokio::test]
    async fn prefix_resolution_and_ambiguity() {
        let mut registry = CommandRegistry::new();
        registry.register(noop("server", "a")).unwrap();
        registry.register(noop("screen", "a")).unwrap();

        let result = registry.invoke_line("scr").unwrap().await.unwrap();
        assert_eq!(result, "done");

        match registry.invoke_line("s") {
            Err(CoreError::AmbiguousCommand { candidates, .. }) => {
                assert_eq!(candidates.len(), 2);
            }
            other => panic!("expected ambiguity, got {:?}", other.map(|_| ())),
        }

        assert!(matches!(
            registry.invoke_line("nope"),
            Err(CoreError::UnknownCommand(_))
        ));
    }

    #[tokio::test]
    async fn alias_resolution() {
        let mut registry = CommandRegistry::new();
        registry.register(noop("exit", "a").alias("quit")).unwrap();
        assert_eq!(registry.resolve("qu").unwrap(), "exit");
    }

    #[test]
    fn option_parsing_kinds_and_forms() {
        let command = noop("server", "a")
            .option("address", OptionKind::Text, "bind address")
            .option("port", OptionKind::Int, "bind port")
            .option("verbose", OptionKind::Flag, "more output")
            .option("scale", OptionKind::Double, "scaling");

        let call = command
            .parse_options(&[
                "start".to_string(),
                "--address=10.0.0.1".to_string(),
                "--port".to_string(),
                "25530".to_string(),
                "--verbose".to_string(),
                "--scale=1.5".to_string(),
            ])
            .unwrap();
        assert_eq!(call.positionals, vec!["start".to_string()]);
        assert_eq!(call.text("address"), Some("10.0.0.1"));
        assert_eq!(call.int("port"), Some(25530));
        assert!(call.flag("verbose"));
        assert_eq!(call.double("scale"), Some(1.5));
    }

    #[test]
    fn unknown_and_malformed_options_fail() {
        let command = noop("server", "a").option("port", OptionKind::Int, "bind port");
        assert!(command
            .parse_options(&["--mystery".to_string()])
            .is_err());
        assert!(command
            .parse_options(&["--port=many".to_string()])
            .is_err());
        assert!(command.parse_options(&["--port".to_string()]).is_err());
    }

    #[tokio::test]
    async fn uninstall_module_removes_everything() {
        let mut registry = CommandRegistry::new();
        registry.register(noop("server", "net")).unwrap();
        registry
            .register(noop("screen", "layout").alias("sc"))
            .unwrap();
        registry.uninstall_module("layout");

        assert!(matches!(
            registry.resolve("screen"),
            Err(CoreError::UnknownCommand(_))
        ));
        assert!(matches!(
            registry.resolve("sc"),
            Err(CoreError::UnknownCommand(_))
        ));
        // The other module's command resolves via what is now a unique prefix.
        assert_eq!(registry.resolve("s").unwrap(), "server");
    }

    #[tokio::test]
    async fn proto_typed_message_invokes_command() {
        use screenlink_types::ScreenOp;

        let mut registry = CommandRegistry::new();
        let seen: std::sync::Arc<std::sync::Mutex<Vec<Message>>> =
            std::sync::Arc::default();
        let sink = seen.clone();
        let command = Command::new(
            "screen",
            "layout",
            "layout",
            Box::new(move |call| {
                let sink = sink.clone();
                Box::pin(async move {
                    if let Some(msg) = call.message {
                        sink.lock().unwrap().push(msg);
                    }
                    Ok(String::new())
                })
            }),
        )
        .proto(MessageType::VirtualScreenControl);
        registry.register(command).unwrap();

        let msg = Message::VirtualScreenControl(ScreenOp::Remove {
            name: "beta".to_string(),
        });
        registry.invoke_message(&msg).unwrap().await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);

        // Messages without a mapped command do nothing.
        assert!(registry
            .invoke_message(&Message::CaptureControl(screenlink_types::SwitchOp::Start))
            .is_none());
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = CommandRegistry::new();
        registry.register(noop("server", "a")).unwrap();
        assert!(registry.register(noop("server", "b")).is_err());
    }

    #[test]
    fn help_lists_commands() {
        let mut registry = CommandRegistry::new();
        registry
            .register(noop("server", "a").option("port", OptionKind::Int, "bind port"))
            .unwrap();
        let help = registry.help(&[]);
        assert!(help.contains("server"));
        assert!(help.contains("--port"));
    }
}
