use std::io::{self, BufRead, Write};

use fatckfs::RepairPolicy;

/// Prompts on the terminal for each proposed repair. EOF and read errors
/// fall back to the prompt's default answer.
#[derive(Debug, Default)]
pub struct Interactive;

impl RepairPolicy for Interactive {
    fn ask(&mut self, default_yes: bool, what: &str) -> bool {
        let suffix = if default_yes { "[Y/n]" } else { "[y/N]" };
        print!("{what}? {suffix} ");
        if io::stdout().flush().is_err() {
            return default_yes;
        }
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => default_yes,
            Ok(_) => match line.trim() {
                "" => default_yes,
                s => s.eq_ignore_ascii_case("y") || s.eq_ignore_ascii_case("yes"),
            },
        }
    }
}
