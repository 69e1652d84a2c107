//! Colored output helpers for CLI
//!
//! Provides consistent, colored terminal output for the folio CLI.

use crate::types::{Answer, IngestReport};
use owo_colors::OwoColorize;
use std::io::{self, BufRead, Write};

/// Output style configuration
pub struct Output {
    /// Whether to use colored output
    pub colored: bool,
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Output {
    /// Create a new output helper with colors enabled
    pub fn new() -> Self {
        Self { colored: true }
    }

    /// Create a new output helper with colors disabled
    pub fn no_color() -> Self {
        Self { colored: false }
    }

    /// Print a success message with a checkmark
    pub fn success(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "✓".green().bold(), message.green());
        } else {
            println!("  [OK] {}", message);
        }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "•".blue(), message);
        } else {
            println!("  [INFO] {}", message);
        }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.colored {
            println!("  {} {}", "⚠".yellow().bold(), message.yellow());
        } else {
            println!("  [WARN] {}", message);
        }
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        if self.colored {
            eprintln!("  {} {}", "✗".red().bold(), message.red());
        } else {
            eprintln!("  [ERROR] {}", message);
        }
    }

    /// Print a file creation message
    pub fn created(&self, file_type: &str, path: &str) {
        if self.colored {
            println!(
                "  {} {} {}",
                "✓".green().bold(),
                file_type.dimmed(),
                path.bright_white()
            );
        } else {
            println!("  [CREATED] {} {}", file_type, path);
        }
    }

    /// Print a file skipped message
    pub fn skipped(&self, path: &str, reason: &str) {
        if self.colored {
            println!(
                "  {} {} {}",
                "○".yellow(),
                path.dimmed(),
                format!("({})", reason).yellow()
            );
        } else {
            println!("  [SKIPPED] {} ({})", path, reason);
        }
    }

    /// Print a header for a section
    pub fn header(&self, title: &str) {
        if self.colored {
            println!("\n  {}", title.bright_white().bold().underline());
        } else {
            println!("\n  === {} ===", title);
        }
    }

    /// Print a key-value pair
    pub fn kv(&self, key: &str, value: &str) {
        if self.colored {
            println!("    {}: {}", key.dimmed(), value.bright_white());
        } else {
            println!("    {}: {}", key, value);
        }
    }

    /// Print a hint/tip message
    pub fn hint(&self, message: &str) {
        if self.colored {
            println!("\n  {} {}", "💡".dimmed(), message.dimmed().italic());
        } else {
            println!("\n  [TIP] {}", message);
        }
    }

    /// Print a command suggestion
    pub fn command(&self, cmd: &str) {
        if self.colored {
            println!("     {}", format!("$ {}", cmd).bright_cyan());
        } else {
            println!("     $ {}", cmd);
        }
    }

    /// Print the numbered document menu
    pub fn document_menu(&self, documents: &[String]) {
        for (i, name) in documents.iter().enumerate() {
            if self.colored {
                println!("    {} {}", format!("{}.", i + 1).bright_cyan(), name);
            } else {
                println!("    {}. {}", i + 1, name);
            }
        }
    }

    /// Print a summary of a finished ingestion
    pub fn ingest_report(&self, report: &IngestReport) {
        self.success(&format!(
            "Ingested '{}' ({})",
            report.document_name, report.mode
        ));
        self.kv("pages", &report.pages.to_string());
        self.kv("empty pages", &report.empty_pages.to_string());
        self.kv("chunks", &report.chunks.to_string());
        self.kv("elapsed", &format!("{} ms", report.elapsed.as_millis()));
    }

    /// Print an answer followed by its numbered source quotes
    pub fn answer(&self, answer: &Answer) {
        println!();
        if self.colored {
            println!("{}", answer.text.bright_white());
        } else {
            println!("{}", answer.text);
        }
        println!();
        print!("{}", render_sources(answer));
    }

    /// Prompt for a line of input; `None` at end of input
    pub fn prompt(&self, message: &str) -> Option<String> {
        if self.colored {
            print!("  {} ", message.bright_yellow().bold());
        } else {
            print!("  {} ", message);
        }
        io::stdout().flush().ok();

        let mut input = String::new();
        match io::stdin().lock().read_line(&mut input) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(input.trim().to_string()),
        }
    }

    /// Prompt for confirmation (returns true if user confirms)
    pub fn confirm(&self, message: &str) -> bool {
        self.prompt(&format!("{} [y/N]:", message))
            .map(|input| {
                let input = input.to_lowercase();
                input == "y" || input == "yes"
            })
            .unwrap_or(false)
    }
}

/// Markdown list of sources: one block quote per retrieved chunk, in rank
/// order, with the chunk's whitespace flattened to single spaces.
pub fn render_sources(answer: &Answer) -> String {
    if answer.sources.is_empty() {
        return String::new();
    }

    let mut out = String::from("**Sources:**\n\n");
    for (i, chunk) in answer.sources.iter().enumerate() {
        let quote = chunk.content.split_whitespace().collect::<Vec<_>>().join(" ");
        out.push_str(&format!(
            "> **[{}]** From *{}*, page {}:\n> \"{}\"\n\n",
            i + 1,
            chunk.document_name,
            chunk.page_number,
            quote
        ));
    }
    out
}
