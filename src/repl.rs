use std::sync::Arc;

use rustyline::{error::ReadlineError, DefaultEditor};

use crate::{
    context::Context,
    diagnostics::{CellError, Result},
    host::HostBridge,
    lexer::{self, Keyword, TokenKind},
    runtime::{ExecutionLimits, Interpreter},
};

const PROMPT: &str = ">> ";
const CONTINUATION: &str = ".. ";

/// A terminal notebook: each submitted chunk is a cell run against one
/// persistent context.
pub struct Repl {
    interpreter: Interpreter,
    context: Context,
}

impl Repl {
    pub fn new(bridge: Arc<HostBridge>, limits: ExecutionLimits) -> Self {
        Self {
            interpreter: Interpreter::new(bridge).with_limits(limits),
            context: Context::new(),
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn run(&mut self) -> Result<()> {
        let mut editor = DefaultEditor::new().map_err(readline_error)?;
        let mut buffer = String::new();
        loop {
            let prompt = if buffer.is_empty() { PROMPT } else { CONTINUATION };
            match editor.readline(prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if buffer.is_empty() {
                        match trimmed {
                            ":quit" | ":exit" => break,
                            ":context" => {
                                self.print_context();
                                continue;
                            }
                            ":functions" => {
                                for line in function_listing(self.interpreter.bridge()) {
                                    println!("{line}");
                                }
                                continue;
                            }
                            ":clear" => {
                                self.context.clear();
                                continue;
                            }
                            "" => continue,
                            _ => {}
                        }
                    }
                    editor.add_history_entry(trimmed).ok();
                    buffer.push_str(&line);
                    buffer.push('\n');
                    if open_blocks(&buffer) > 0 {
                        continue;
                    }
                    let cell = std::mem::take(&mut buffer);
                    for line in self.eval_cell(&cell) {
                        println!("{line}");
                    }
                }
                Err(ReadlineError::Interrupted) => buffer.clear(),
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(readline_error(err)),
            }
        }
        Ok(())
    }

    /// Runs one cell and returns the lines to show: every display, or the last
    /// value when nothing was displayed.
    pub fn eval_cell(&mut self, source: &str) -> Vec<String> {
        match self.interpreter.eval_source(source, &mut self.context) {
            Ok(evaluation) if !evaluation.displays.is_empty() => evaluation
                .displays
                .iter()
                .map(|display| display.value.to_text())
                .collect(),
            Ok(evaluation) => evaluation
                .last_value
                .map(|value| vec![value.to_text()])
                .unwrap_or_default(),
            Err(diagnostic) => vec![format!("error: {diagnostic}")],
        }
    }

    fn print_context(&self) {
        if self.context.is_empty() {
            println!("(empty)");
        }
        for (name, value) in self.context.iter() {
            println!("{name} = {}", value.to_json_pretty());
        }
    }
}

/// One `Namespace: f, g, ...` line per registered namespace.
pub fn function_listing(bridge: &HostBridge) -> Vec<String> {
    bridge
        .namespaces()
        .filter_map(|name| bridge.resolve(name))
        .map(|namespace| format!("{}: {}", namespace.name(), namespace.functions().join(", ")))
        .collect()
}

/// `if`/`for` headers still waiting for their `end`.
pub fn open_blocks(source: &str) -> isize {
    lexer::tokenize(source)
        .iter()
        .map(|token| match token.kind {
            TokenKind::Keyword(Keyword::If | Keyword::For) => 1,
            TokenKind::Keyword(Keyword::End) => -1,
            _ => 0,
        })
        .sum()
}

fn readline_error(err: ReadlineError) -> CellError {
    CellError::from(std::io::Error::new(std::io::ErrorKind::Other, err))
}
