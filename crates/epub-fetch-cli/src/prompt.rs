//! Interactive questions on the terminal.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

/// Ask a yes/no question. Only `y` or `yes` (any case) counts as yes.
pub fn confirm<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> io::Result<bool> {
    write!(output, "{question} (y/N): ")?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    let answer = answer.trim().to_ascii_lowercase();
    Ok(answer == "y" || answer == "yes")
}

/// Ask for a path. `None` on an empty answer.
pub fn ask_path<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> io::Result<Option<PathBuf>> {
    write!(output, "{question}: ")?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    let answer = answer.trim().trim_matches('"');
    Ok((!answer.is_empty()).then(|| PathBuf::from(answer)))
}
