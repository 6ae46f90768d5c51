use anyhow::Result;
use toolchat::models::message::Message;

pub mod rustyline;

pub trait Prompt {
    fn get_input(&mut self) -> Result<Input>;
    fn render_reply(&mut self, reply: &str);
    fn render_history(&mut self, conversation: &[Message]);
    /// Short acknowledgements for commands like reset/ and tokens/
    fn render_notice(&mut self, text: &str);
    fn render_error(&mut self, error: &str);
    fn show_busy(&mut self);
    fn hide_busy(&mut self);
    fn close(&self);
    fn ready(&self) {
        println!("\n");
        println!("toolchat is running! Enter a message, or exit/ reset/ print/ history/ tokens/.");
        println!("\n");
    }
    // Used for testing. Allows us to downcast to any type.
    #[cfg(test)]
    fn as_any(&self) -> &dyn std::any::Any;
}

#[derive(Debug, PartialEq)]
pub struct Input {
    pub input_type: InputType,
    pub content: Option<String>, // Only set for messages
}

#[derive(Debug, PartialEq)]
pub enum InputType {
    AskAgain, // Ask the user for input again. Control flow command.
    Message,  // User sent a message
    Exit,     // exit/
    Reset,    // reset/
    Print,    // print/
    History,  // history/
    Tokens,   // tokens/
}

impl Input {
    pub fn command(input_type: InputType) -> Self {
        Self {
            input_type,
            content: None,
        }
    }

    pub fn message<S: Into<String>>(text: S) -> Self {
        Self {
            input_type: InputType::Message,
            content: Some(text.into()),
        }
    }
}

/// Classify one line typed by the user. Commands are case-insensitive.
pub fn parse_input(line: &str) -> Input {
    let text = line.trim();
    let command = match text.to_lowercase().as_str() {
        "" => Some(InputType::AskAgain),
        "exit/" => Some(InputType::Exit),
        "reset/" => Some(InputType::Reset),
        "print/" => Some(InputType::Print),
        "history/" => Some(InputType::History),
        "tokens/" => Some(InputType::Tokens),
        _ => None,
    };
    match command {
        Some(input_type) => Input::command(input_type),
        None => Input::message(text),
    }
}
