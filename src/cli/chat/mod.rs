pub mod prompt;

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use color_print::cformat;
use eyre::Result;
use rustyline::error::ReadlineError;

use crate::chat::conversation_state::{Role, SessionKey};
use crate::chat::error::ChatError;
use crate::chat::persona::{ASSISTANT_NAME, HISTORY_CLEARED};
use crate::chat::ChatService;
use prompt::generate_prompt;

/// Session key used by the terminal client.
pub const LOCAL_SESSION: &str = "local";

const HELP_TEXT: &str = "
KumTanesi Chat

/clear        Clear the conversation history
/history      Show the conversation history
/help         Show this help dialogue
/quit         Quit the application
";

/// What the REPL should do after handling a line.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub struct ChatContext {
    output: Box<dyn Write>,
    input: Option<String>,
    interactive: bool,
    chat: Arc<ChatService>,
    session: SessionKey,
}

impl ChatContext {
    pub fn new(
        output: Box<dyn Write>,
        input: Option<String>,
        interactive: bool,
        chat: Arc<ChatService>,
    ) -> Self {
        let session = SessionKey::parse(LOCAL_SESSION).unwrap_or_else(SessionKey::generate);
        Self {
            output,
            input,
            interactive,
            chat,
            session,
        }
    }

    pub async fn run(&mut self) -> Result<ExitCode> {
        // Single message mode
        if let Some(input) = self.input.take() {
            self.handle_input(&input).await?;
            return Ok(ExitCode::SUCCESS);
        }

        if self.interactive {
            writeln!(self.output, "{}\n", self.chat.greeting())?;
            self.run_interactive().await?;
        }

        Ok(ExitCode::SUCCESS)
    }

    async fn run_interactive(&mut self) -> Result<()> {
        let mut rl = prompt::rl()?;

        loop {
            let prompt_text = generate_prompt(self.chat.history(&self.session).len());
            match rl.readline(&prompt_text) {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    rl.add_history_entry(line.as_str());

                    match self.handle_input(&line).await {
                        Ok(Flow::Quit) => break,
                        Ok(Flow::Continue) => {}
                        Err(e) => writeln!(self.output, "Error: {}", e)?,
                    }
                }
                Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
                Err(e) => {
                    writeln!(self.output, "Error: {}", e)?;
                    break;
                }
            }
        }

        Ok(())
    }

    async fn handle_input(&mut self, input: &str) -> Result<Flow> {
        match input.trim() {
            "/quit" => return Ok(Flow::Quit),
            "/help" => {
                writeln!(self.output, "{}", HELP_TEXT)?;
            }
            "/clear" => {
                self.chat.clear(&self.session)?;
                writeln!(self.output, "{}", HISTORY_CLEARED)?;
            }
            "/history" => self.print_history()?,
            message => self.process_chat_input(message).await?,
        }
        Ok(Flow::Continue)
    }

    async fn process_chat_input(&mut self, input: &str) -> Result<()> {
        match self.chat.send(&self.session, input).await {
            Ok(reply) => {
                writeln!(self.output, "{}", cformat!("<green,bold>{}:</> {}", ASSISTANT_NAME, reply.response))?;
            }
            Err(ChatError::InvalidInput) => {
                writeln!(self.output, "{}", ChatError::InvalidInput.user_notice())?;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn print_history(&mut self) -> Result<()> {
        let history = self.chat.history(&self.session);
        if history.is_empty() {
            writeln!(self.output, "(empty)")?;
        }
        for message in history {
            let line = match message.role {
                Role::User => cformat!("<cyan,bold>you:</> {}", message.content),
                Role::Assistant => cformat!("<green,bold>{}:</> {}", ASSISTANT_NAME, message.content),
            };
            writeln!(self.output, "{}", line)?;
        }
        Ok(())
    }
}
