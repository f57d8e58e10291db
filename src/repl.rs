//! Interactive session loop
//!
//! Reads commands line by line and, when an OSC control listener is running,
//! interleaves the commands it forwards. Both sources go through the same
//! [`CommandHandler`], one command at a time.

use crate::command::{CommandHandler, SessionCommand};
use crate::error::SessionResult;
use crate::runtime::EvalRuntime;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

enum Input {
    Line(Option<String>),
    Control(Option<SessionCommand>),
}

async fn recv_control(control: &mut Option<mpsc::Receiver<SessionCommand>>) -> Option<SessionCommand> {
    match control {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

pub struct Repl<'a, R: EvalRuntime> {
    handler: &'a CommandHandler<R>,
    control: Option<mpsc::Receiver<SessionCommand>>,
    prompt: bool,
}

impl<'a, R: EvalRuntime> Repl<'a, R> {
    pub fn new(handler: &'a CommandHandler<R>) -> Self {
        Self {
            handler,
            control: None,
            prompt: true,
        }
    }

    /// Also execute commands arriving from an OSC control listener
    pub fn with_control(mut self, control: mpsc::Receiver<SessionCommand>) -> Self {
        self.control = Some(control);
        self
    }

    pub fn with_prompt(mut self, prompt: bool) -> Self {
        self.prompt = prompt;
        self
    }

    /// Run until `quit` or end of input, then hush
    pub async fn run<I, W>(mut self, input: I, out: &mut W) -> SessionResult<()>
    where
        I: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = input.lines();

        loop {
            if self.prompt {
                write!(out, "> ")?;
                out.flush()?;
            }

            let next = tokio::select! {
                line = lines.next_line() => Input::Line(line?),
                command = recv_control(&mut self.control) => Input::Control(command),
            };

            let command = match next {
                Input::Line(None) => break,
                Input::Line(Some(line)) => match SessionCommand::parse(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(e) => {
                        writeln!(out, "error: {}", e)?;
                        continue;
                    }
                },
                Input::Control(Some(command)) => {
                    debug!("Control command {:?}", command);
                    command
                }
                Input::Control(None) => {
                    warn!("OSC control listener stopped");
                    self.control = None;
                    continue;
                }
            };

            if command == SessionCommand::Quit {
                break;
            }

            match self.handler.execute(command).await {
                Ok(message) => writeln!(out, "{}", message)?,
                Err(e) => writeln!(out, "error: {}", e)?,
            }
        }

        if self.handler.engine().is_playing() {
            self.handler.execute(SessionCommand::Hush).await?;
        }
        writeln!(out, "bye")?;
        Ok(())
    }
}
