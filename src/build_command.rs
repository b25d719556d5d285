//! Interactive command builder (`--build`).
//!
//! Walks the user through the options and prints the equivalent
//! command line. Nothing is aggregated here.

use crate::locator::find_report_files;
use anyhow::{Context, Result};
use console::style;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::debug;

const DEFAULT_SOURCES: &str = "./reports/**/*.json";
const DEFAULT_OUTPUT: &str = "./reports";
const PREVIEW_LIMIT: usize = 5;

/// Source of answers for the builder. `Ok(None)` means the user cancelled.
pub trait Prompter {
    fn text(&mut self, message: &str, default: &str) -> Result<Option<String>>;
    fn confirm(&mut self, message: &str) -> Result<Option<bool>>;
    fn info(&mut self, message: &str);
}

/// Terminal prompts backed by rustyline.
pub struct TerminalPrompter {
    editor: DefaultEditor,
}

impl TerminalPrompter {
    pub fn new() -> Result<Self> {
        let editor = DefaultEditor::new().context("Failed to initialize terminal prompt")?;
        Ok(Self { editor })
    }

    fn read(&mut self, prompt: &str) -> Result<Option<String>> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(Some(line.trim().to_string())),
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(None),
            Err(e) => Err(e).context("Failed to read input"),
        }
    }
}

impl Prompter for TerminalPrompter {
    fn text(&mut self, message: &str, default: &str) -> Result<Option<String>> {
        let prompt = format!("{} {} ", style("?").cyan(), message);
        let prompt = format!("{}{} ", prompt, style(format!("({})", default)).dim());

        Ok(self.read(&prompt)?.map(|answer| {
            if answer.is_empty() {
                default.to_string()
            } else {
                answer
            }
        }))
    }

    fn confirm(&mut self, message: &str) -> Result<Option<bool>> {
        let prompt = format!("{} {} {} ", style("?").cyan(), message, style("[Y/n]").dim());

        loop {
            let Some(answer) = self.read(&prompt)? else {
                return Ok(None);
            };
            match parse_yes_no(&answer) {
                Some(value) => return Ok(Some(value)),
                None => println!("   Please answer yes or no."),
            }
        }
    }

    fn info(&mut self, message: &str) {
        println!("{}", message);
    }
}

fn parse_yes_no(answer: &str) -> Option<bool> {
    match answer.to_lowercase().as_str() {
        "" | "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

/// Answers collected by the builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltCommand {
    pub sources: String,
    pub output: String,
    pub include_html: bool,
    pub open: bool,
}

impl BuiltCommand {
    /// Render as a shell command line.
    pub fn command_line(&self) -> String {
        let mut cmd = format!(
            "report-aggregator --sources \"{}\" --output \"{}\"",
            self.sources, self.output
        );
        if self.include_html {
            cmd.push_str(" --include-html");
        }
        if self.open {
            cmd.push_str(" --open");
        }
        cmd
    }
}

/// Ask the questions. Returns `None` if the user cancelled at any point.
pub fn run_builder<P: Prompter>(prompter: &mut P) -> Result<Option<BuiltCommand>> {
    let sources = loop {
        let Some(glob) = prompter.text("Where should we look for json reports?", DEFAULT_SOURCES)?
        else {
            return Ok(None);
        };

        let found = match find_report_files(&glob) {
            Ok(found) => found,
            Err(e) => {
                prompter.info(&format!("❌ {}\n   Please try another glob pattern.", e));
                continue;
            }
        };
        debug!("Builder glob {} matched {} files", glob, found.len());

        if found.is_empty() {
            prompter.info(&format!(
                "❌ No reports found at {}.\n   Please try another glob pattern.",
                glob
            ));
            continue;
        }

        let mut preview: Vec<String> = found
            .iter()
            .take(PREVIEW_LIMIT)
            .map(|p| format!("     📄 {}", p.display()))
            .collect();
        if found.len() > PREVIEW_LIMIT {
            preview.push("     ...".to_string());
        }
        prompter.info(&format!(
            "✅ Found {} reports at {}:\n{}",
            found.len(),
            style(&glob).green().bold(),
            preview.join("\n")
        ));

        match prompter.confirm("Is this correct?")? {
            None => return Ok(None),
            Some(true) => break glob,
            Some(false) => continue,
        }
    };

    let Some(output) = prompter.text("Where should we write the aggregated report to?", DEFAULT_OUTPUT)?
    else {
        return Ok(None);
    };

    let Some(include_html) = prompter
        .confirm("Include HTML reports? (located in the same directory as the JSON reports)")?
    else {
        return Ok(None);
    };

    let Some(open) = prompter.confirm("Open aggregated report?")? else {
        return Ok(None);
    };

    Ok(Some(BuiltCommand {
        sources,
        output,
        include_html,
        open,
    }))
}
