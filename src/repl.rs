// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Interactive REPL (Read-Eval-Print Loop) for ekanscrypt.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use ekanscrypt::ast::KEYWORDS;
use ekanscrypt::{Engine, EngineConfig, Error, Value};
use owo_colors::OwoColorize;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Config, Editor, Helper};

const HISTORY_FILE: &str = ".ekans_history";
const MAX_HISTORY_SIZE: usize = 1000;

/// Dot commands understood by the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplCommand {
    Help,
    Exit,
    Clear,
    Version,
    Load,
}

/// Spellings, usage and description of each command.
const COMMANDS: &[(ReplCommand, &[&str], &str, &str)] = &[
    (ReplCommand::Help, &["help", "h", "?"], ".help", "List commands and shortcuts"),
    (ReplCommand::Exit, &["exit", "quit", "q"], ".exit", "Leave the session"),
    (ReplCommand::Clear, &["clear", "cls"], ".clear", "Clear the terminal"),
    (ReplCommand::Version, &["version", "v"], ".version", "Print the ekans version"),
    (ReplCommand::Load, &["load", "l"], ".load <file>", "Run a module file and show its exports"),
];

impl ReplCommand {
    /// Splits `.name argument` into a command and its trimmed argument.
    pub fn parse(input: &str) -> Option<(Self, Option<&str>)> {
        let rest = input.trim().strip_prefix('.')?;
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, Some(arg.trim()).filter(|a| !a.is_empty())),
            None => (rest, None),
        };
        let name = name.to_lowercase();
        COMMANDS
            .iter()
            .find(|(_, spellings, _, _)| spellings.contains(&name.as_str()))
            .map(|&(command, _, _, _)| (command, arg))
    }
}

/// Completion, hints, highlighting and multi-line validation.
#[derive(Default)]
struct EkansHelper {
    /// Keywords, commands and names bound in the session
    words: Vec<String>,
}

impl EkansHelper {
    fn new(names: Vec<String>) -> Self {
        let mut helper = Self::default();
        helper.set_names(names);
        helper
    }

    fn set_names(&mut self, names: Vec<String>) {
        let commands = COMMANDS.iter().map(|(_, spellings, _, _)| format!(".{}", spellings[0]));
        let mut words: Vec<String> = KEYWORDS
            .iter()
            .map(|w| w.to_string())
            .chain(commands)
            .chain(names)
            .collect();
        words.sort();
        words.dedup();
        self.words = words;
    }

    /// The rest of the first word that extends the word under the cursor.
    fn suffix_for(&self, line: &str) -> Option<&str> {
        let word = Self::current_word(line);
        if word.len() < 2 {
            return None;
        }
        self.words
            .iter()
            .find(|w| w.starts_with(word) && w.len() > word.len())
            .map(|w| &w[word.len()..])
    }

    fn current_word(line: &str) -> &str {
        let start = line
            .rfind(|c: char| !c.is_alphanumeric() && c != '_' && c != '.')
            .map(|i| i + 1)
            .unwrap_or(0);
        &line[start..]
    }
}

impl Completer for EkansHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let word = Self::current_word(&line[..pos]);
        if word.is_empty() {
            return Ok((pos, vec![]));
        }

        let matches: Vec<Pair> = self
            .words
            .iter()
            .filter(|w| w.starts_with(word))
            .map(|w| Pair {
                display: w.clone(),
                replacement: w[word.len()..].to_string(),
            })
            .collect();

        Ok((pos, matches))
    }
}

impl Hinter for EkansHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<Self::Hint> {
        if pos < line.len() {
            return None;
        }
        self.suffix_for(line)
            .map(|rest| rest.to_string().dimmed().to_string())
    }
}

impl Highlighter for EkansHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        let mut result = String::with_capacity(line.len() * 2);
        let mut word = String::new();
        let mut quote = None;

        for c in line.chars() {
            if let Some(q) = quote {
                word.push(c);
                if c == q {
                    result.push_str(&word.green().to_string());
                    word.clear();
                    quote = None;
                }
                continue;
            }
            if c.is_alphanumeric() || c == '_' {
                word.push(c);
                continue;
            }
            if !word.is_empty() {
                result.push_str(&highlight_word(&word));
                word.clear();
            }
            match c {
                '"' | '\'' => {
                    quote = Some(c);
                    word.push(c);
                }
                '(' | ')' | '[' | ']' | '{' | '}' => result.push_str(&c.yellow().to_string()),
                '+' | '-' | '*' | '/' | '%' | '=' | '<' | '>' | '!' | '&' | '|' | '^' | '@' => {
                    result.push_str(&c.cyan().to_string())
                }
                '.' if line.starts_with('.') => result.push_str(&c.magenta().to_string()),
                _ => result.push(c),
            }
        }

        if quote.is_some() {
            result.push_str(&word.green().to_string());
        } else if !word.is_empty() {
            result.push_str(&highlight_word(&word));
        }
        Cow::Owned(result)
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn highlight_word(word: &str) -> String {
    const LITERALS: &[&str] = &["true", "false", "null", "nan", "infinity"];

    if LITERALS.contains(&word) {
        word.blue().to_string()
    } else if KEYWORDS.contains(&word) {
        word.magenta().bold().to_string()
    } else if word.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        word.yellow().to_string()
    } else {
        word.to_string()
    }
}

impl Validator for EkansHelper {
    fn validate(&self, ctx: &mut ValidationContext<'_>) -> rustyline::Result<ValidationResult> {
        let input = ctx.input();
        if !is_balanced(input) {
            return Ok(ValidationResult::Incomplete);
        }
        let trimmed = input.trim_end();
        if trimmed.ends_with('\\') || trimmed.ends_with("=>") {
            return Ok(ValidationResult::Incomplete);
        }
        Ok(ValidationResult::Valid(None))
    }
}

/// True when every bracket opened outside strings and comments is closed.
fn is_balanced(input: &str) -> bool {
    let mut stack = Vec::new();
    let mut quote = None;
    let mut escape_next = false;
    let mut in_comment = false;

    for c in input.chars() {
        if in_comment {
            in_comment = c != '\n';
            continue;
        }
        if escape_next {
            escape_next = false;
            continue;
        }
        if c == '\\' && quote.is_some() {
            escape_next = true;
            continue;
        }

        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '#' => in_comment = true,
                '"' | '\'' => quote = Some(c),
                '(' => stack.push(')'),
                '[' => stack.push(']'),
                '{' => stack.push('}'),
                ')' | ']' | '}' => {
                    // A stray closer is a syntax error for the parser to report.
                    if stack.pop() != Some(c) {
                        return true;
                    }
                }
                _ => {}
            },
        }
    }

    stack.is_empty() && quote.is_none()
}

impl Helper for EkansHelper {}

/// The interactive session.
pub struct Repl {
    engine: Engine,
    editor: Editor<EkansHelper, DefaultHistory>,
    history_path: PathBuf,
}

impl Repl {
    pub fn new(config: EngineConfig) -> rustyline::Result<Self> {
        let editor_config = Config::builder()
            .history_ignore_dups(true)?
            .history_ignore_space(true)
            .max_history_size(MAX_HISTORY_SIZE)?
            .auto_add_history(true)
            .build();

        let engine = Engine::with_config(config);
        let mut editor = Editor::with_config(editor_config)?;
        editor.set_helper(Some(EkansHelper::new(engine.names())));

        let history_path = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(HISTORY_FILE);
        if let Err(e) = editor.load_history(&history_path) {
            tracing::debug!(error = %e, "no REPL history loaded");
        }

        Ok(Self {
            engine,
            editor,
            history_path,
        })
    }

    pub fn run(&mut self) -> rustyline::Result<()> {
        self.print_banner();

        loop {
            match self.editor.readline(&self.prompt()) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    if let Some((cmd, arg)) = ReplCommand::parse(trimmed) {
                        match self.execute_command(cmd, arg) {
                            CommandResult::Continue => continue,
                            CommandResult::Exit => break,
                        }
                    }
                    self.eval_and_print(&line);
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C".dimmed());
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "^D".dimmed());
                    break;
                }
                Err(err) => {
                    eprintln!("{}: {:?}", "Error".red().bold(), err);
                    break;
                }
            }
        }

        if let Err(e) = self.editor.save_history(&self.history_path) {
            tracing::warn!(error = %e, "failed to save REPL history");
        }
        println!();
        Ok(())
    }

    fn print_banner(&self) {
        println!();
        println!(
            "  {} {} {}",
            "ekanscrypt".bright_cyan().bold(),
            "v".dimmed(),
            env!("CARGO_PKG_VERSION").bright_yellow()
        );
        println!(
            "  {} {} {}",
            "Type".dimmed(),
            ".help".cyan(),
            "for available commands".dimmed()
        );
        println!();
    }

    fn prompt(&self) -> String {
        format!("{} ", "ekans>".bright_green().bold())
    }

    fn execute_command(&mut self, cmd: ReplCommand, arg: Option<&str>) -> CommandResult {
        match cmd {
            ReplCommand::Help => self.print_help(),
            ReplCommand::Exit => return CommandResult::Exit,
            ReplCommand::Clear => print!("\x1B[2J\x1B[H"),
            ReplCommand::Version => {
                println!("{} {}", "ekans".bright_cyan().bold(), env!("CARGO_PKG_VERSION").yellow());
            }
            ReplCommand::Load => match arg {
                Some(path) => self.load_file(Path::new(path)),
                None => eprintln!(
                    "{}: {} {}",
                    "Error".red().bold(),
                    ".load".cyan(),
                    "requires a file path".dimmed()
                ),
            },
        }
        CommandResult::Continue
    }

    fn print_help(&self) {
        println!();
        for (_, _, usage, about) in COMMANDS {
            println!("  {:<16} {}", usage.cyan(), about.dimmed());
        }
        println!();
        for (keys, about) in [
            ("Tab", "complete keywords and bound names"),
            ("Ctrl+C", "discard the current input"),
            ("Ctrl+D", "leave the session"),
        ] {
            println!("  {:<16} {}", keys.yellow(), about.dimmed());
        }
        println!();
    }

    fn load_file(&mut self, path: &Path) {
        match self.engine.run_file(path) {
            Ok(exports) => println!("{}", format_value(&exports)),
            Err(e) => {
                let source = std::fs::read_to_string(path).unwrap_or_default();
                print_error(&e, &path.display().to_string(), &source);
            }
        }
    }

    fn eval_and_print(&mut self, input: &str) {
        match self.engine.eval(input) {
            Ok(Value::None) => {}
            Ok(value) => println!("{}", format_value(&value)),
            Err(e) => print_error(&e, "<stdin>", input),
        }
        let names = self.engine.names();
        if let Some(helper) = self.editor.helper_mut() {
            helper.set_names(names);
        }
    }
}

enum CommandResult {
    Continue,
    Exit,
}

/// Colors a value's repr by type.
fn format_value(value: &Value) -> String {
    let text = value.repr();
    match value {
        Value::None => text.blue().dimmed().to_string(),
        Value::Bool(_) | Value::Int(_) | Value::BigInt(_) | Value::Float(_) | Value::Complex(..) => {
            text.yellow().to_string()
        }
        Value::Str(_) | Value::Bytes(_) => text.green().to_string(),
        Value::Function(_) | Value::Builtin(_) | Value::BoundMethod(_) | Value::Class(_) => {
            text.magenta().to_string()
        }
        _ => text.cyan().to_string(),
    }
}

fn print_error(error: &Error, path: &str, source: &str) {
    if error.diagnostic().is_some() {
        eprintln!("{}", error.render(path, source).red());
        return;
    }
    let text = error.to_string();
    match text.split_once(':') {
        Some((kind, message)) => eprintln!("{}:{}", kind.red().bold(), message),
        None => eprintln!("{}", text.red()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repl_command_parse() {
        assert!(matches!(
            ReplCommand::parse(".help"),
            Some((ReplCommand::Help, None))
        ));
        assert!(matches!(
            ReplCommand::parse(".exit"),
            Some((ReplCommand::Exit, None))
        ));
        assert!(matches!(
            ReplCommand::parse(".load lib/util.es"),
            Some((ReplCommand::Load, Some("lib/util.es")))
        ));
        assert!(ReplCommand::parse("x = .5").is_none());
        assert!(ReplCommand::parse(".unknown").is_none());
    }

    #[test]
    fn test_is_balanced() {
        assert!(is_balanced("f(1, 2)"));
        assert!(is_balanced("{'a': 1}"));
        assert!(!is_balanced("while x < 3 {"));
        assert!(!is_balanced("[1, 2"));
        assert!(is_balanced("'string with (unbalanced'"));
        assert!(is_balanced("x = 1 # comment with {"));
    }

    #[test]
    fn test_completion_words_include_session_names() {
        let helper = EkansHelper::new(vec!["counter".to_string()]);
        assert!(helper.words.iter().any(|w| w == "counter"));
        assert!(helper.words.iter().any(|w| w == "while"));
        assert_eq!(EkansHelper::current_word("x = coun"), "coun");
    }

    #[test]
    fn test_hint_suffix() {
        let helper = EkansHelper::new(vec!["counter".to_string()]);
        assert_eq!(helper.suffix_for("x = coun"), Some("ter"));
        assert_eq!(helper.suffix_for("whi"), Some("le"));
        assert_eq!(helper.suffix_for("c"), None);
        assert_eq!(helper.suffix_for("counter"), None);
    }
}
