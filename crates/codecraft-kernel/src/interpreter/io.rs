//! Host I/O capabilities handed to the interpreter.
//!
//! `print` writes through an [`OutputSink`], `input` reads through an
//! [`InputSource`]. The interpreter has no other access to the console.

use std::collections::VecDeque;

pub trait OutputSink {
    /// Append text to the program's output.
    fn write(&mut self, text: &str);
}

pub trait InputSource {
    /// Produce one line of input for the given prompt.
    fn read_line(&mut self, prompt: &str) -> String;
}

/// Collects output in memory.
#[derive(Debug, Default, Clone)]
pub struct BufferedOutput {
    text: String,
}

impl BufferedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl OutputSink for BufferedOutput {
    fn write(&mut self, text: &str) {
        self.text.push_str(text);
    }
}

/// Serves pre-supplied lines; an exhausted source yields empty strings.
#[derive(Debug, Default, Clone)]
pub struct ScriptedInput {
    lines: VecDeque<String>,
}

impl ScriptedInput {
    pub fn new(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
        }
    }
}

impl InputSource for ScriptedInput {
    fn read_line(&mut self, _prompt: &str) -> String {
        self.lines.pop_front().unwrap_or_default()
    }
}
