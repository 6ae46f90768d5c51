use std::io::{self, Write};

use anyhow::Result;
use bat::WrappingMode;
use cliclack::spinner;
use console::style;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use toolchat::models::message::Message;
use toolchat::models::role::Role;

use super::{parse_input, Input, InputType, Prompt};

const PROMPT: &str = "\x1b[1m\x1b[32mHuman User\x1b[0m: ";
const SEPARATOR_WIDTH: usize = 50;

pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    fn bat_theme(&self) -> &'static str {
        match self {
            Theme::Light => "GitHub",
            Theme::Dark => "zenburn",
        }
    }
}

pub struct RustylinePrompt {
    editor: DefaultEditor,
    spinner: cliclack::ProgressBar,
    theme: Theme,
}

impl RustylinePrompt {
    pub fn new(theme: Theme) -> Result<Self> {
        Ok(RustylinePrompt {
            editor: DefaultEditor::new()?,
            spinner: spinner(),
            theme,
        })
    }
}

fn print_markdown(content: &str, theme: &str) {
    let printed = bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(content.as_bytes()))
        .theme(theme)
        .language("Markdown")
        .wrapping_mode(WrappingMode::Character)
        .print();
    if printed.is_err() {
        println!("{}", content);
    }
}

fn role_label(role: Role) -> String {
    match role {
        Role::System => style("system").yellow().bold().to_string(),
        Role::User => style("Human User").green().bold().to_string(),
        Role::Assistant => style("AI Assistant").cyan().bold().to_string(),
        Role::Tool => style("AI tool").magenta().bold().to_string(),
    }
}

impl Prompt for RustylinePrompt {
    fn get_input(&mut self) -> Result<Input> {
        match self.editor.readline(PROMPT) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    self.editor.add_history_entry(line.as_str())?;
                }
                Ok(parse_input(&line))
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                Ok(Input::command(InputType::Exit))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn render_reply(&mut self, reply: &str) {
        println!("{}:", role_label(Role::Assistant));
        print_markdown(reply, self.theme.bat_theme());
        println!();
        let _ = io::stdout().flush();
    }

    fn render_history(&mut self, conversation: &[Message]) {
        let content_label = style("content").red();
        let tool_calls_label = style("tool_calls").red();

        println!("Chat history:");
        println!("{}", "-".repeat(SEPARATOR_WIDTH));
        for message in conversation {
            println!("{}:", role_label(message.role));
            println!(
                "\t{}: {}",
                content_label,
                message.content.as_deref().unwrap_or("None")
            );
            if message.role == Role::Assistant {
                let calls: Vec<String> = message
                    .tool_calls
                    .iter()
                    .map(|call| format!("{}({})", call.function_name, call.arguments_json()))
                    .collect();
                println!("\t{}: {:?}", tool_calls_label, calls);
                if calls.is_empty() {
                    println!("{}", "-".repeat(SEPARATOR_WIDTH));
                }
            }
        }
    }

    fn render_notice(&mut self, text: &str) {
        println!("{}: {}", role_label(Role::Assistant), text);
    }

    fn render_error(&mut self, error: &str) {
        eprintln!("{} {}", style("Error:").red().bold(), error);
    }

    fn show_busy(&mut self) {
        self.spinner = spinner();
        self.spinner.start("awaiting reply...");
    }

    fn hide_busy(&mut self) {
        self.spinner.stop("");
    }

    fn close(&self) {
        println!("Exiting chat...");
    }

    #[cfg(test)]
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
