//! The interactive shell (spec §5/§6): reads BASIC source line by
//! line from stdin, feeding each one to the same [`Session`] so that
//! an unterminated `IF`/`FOR`/`DO`/`FN` keeps accumulating across
//! lines (prompt switches from `> ` to `  > `, per the CLI prompt
//! contract) while completed statements run immediately and their
//! effects — globals, function definitions, heap contents — persist
//! for every line after.
//!
//! Line editing and history are `rustyline`, the line editor the
//! pack's own CLI (`raya-cli`) uses for the same job.
//!
//! `Session::compile_line` itself distinguishes "still open" from "a
//! real error": it signals the former as `Ok(None)` and the latter as
//! `Err`, so the REPL doesn't need to pattern-match on which
//! `ParseError` variant it got back the way guessing from
//! `compile_program`'s end-of-input errors would require.

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::config::Config;
use crate::host::StdioHost;
use crate::Session;

const PROMPT: &str = "> ";
const CONTINUATION_PROMPT: &str = "  > ";

/// Runs the REPL to completion against stdin/stdout, returning once
/// the user exits (Ctrl-D, or an unrecoverable line-editor error).
pub fn run(config: Config) -> Result<(), ReadlineError> {
    let mut session = Session::new(config).expect("installing the standard library cannot fail");
    let mut host = StdioHost;
    let mut editor = DefaultEditor::new()?;
    let mut continuing = false;

    loop {
        let prompt = if continuing { CONTINUATION_PROMPT } else { PROMPT };
        match editor.readline(prompt) {
            Ok(line) => {
                let _ = editor.add_history_entry(line.as_str());
                match session.compile_line(&line) {
                    Ok(Some(entry)) => {
                        continuing = false;
                        if let Err(e) = session.execute(entry, &mut host) {
                            println!("{}", e.display_for_repl());
                        }
                    }
                    Ok(None) => continuing = true,
                    Err(e) => {
                        println!("{}", e.display_for_repl());
                        session.discard_pending();
                        continuing = false;
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                if continuing {
                    session.discard_pending();
                    continuing = false;
                } else {
                    break;
                }
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
