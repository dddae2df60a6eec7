//! Terminal implementations of the vault's interactive seams.

use std::io::{self, BufRead, Write};
use zeroize::Zeroizing;

use treevault_common::Result;
use treevault_vault::interrupt;
use treevault_vault::{Confirm, DecodeError, PasswordSource};

/// Masked password prompts on the controlling terminal.
pub struct TerminalPasswords;

impl PasswordSource for TerminalPasswords {
    fn current(&mut self) -> Result<Zeroizing<String>> {
        prompt_password("Password: ")
    }

    fn new_password(&mut self) -> Result<Zeroizing<String>> {
        loop {
            let password = prompt_password("New password: ")?;
            let confirm = prompt_password("Confirm new password: ")?;
            if password == confirm {
                return Ok(password);
            }
            eprintln!("Passwords do not match, try again.");
        }
    }
}

/// Prompt for password securely.
///
/// Interrupts are deferred so the terminal gets its echo back. A Ctrl-C at
/// the prompt therefore takes effect once the line is entered.
fn prompt_password(prompt: &str) -> Result<Zeroizing<String>> {
    let deferral = interrupt::defer();
    let password = rpassword::prompt_password(prompt).map(Zeroizing::new);
    drop(deferral);
    interrupt::check()?;
    Ok(password?)
}

/// Asks on stderr/stdin whether to reopen a malformed edit.
pub struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn retry(&mut self, error: &DecodeError) -> Result<bool> {
        let answer = ask_retry(error, &mut io::stderr().lock(), &mut io::stdin().lock());
        interrupt::check()?;
        Ok(answer?)
    }
}

fn ask_retry(
    error: &DecodeError,
    out: &mut impl Write,
    input: &mut impl BufRead,
) -> io::Result<bool> {
    writeln!(out, "Malformed edit: {}", error.message)?;
    if let Some(location) = &error.location {
        let gutter = location.line.to_string();
        writeln!(out, "{} | {}", gutter, location.source_line)?;
        writeln!(
            out,
            "{} | {}^",
            " ".repeat(gutter.len()),
            " ".repeat(location.column.saturating_sub(1))
        )?;
    }
    write!(out, "Press Enter to edit again, or q to discard the edit: ")?;
    out.flush()?;

    let mut answer = String::new();
    if input.read_line(&mut answer)? == 0 {
        writeln!(out)?;
        return Ok(false);
    }
    Ok(wants_retry(&answer))
}

fn wants_retry(answer: &str) -> bool {
    !matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "q" | "quit" | "n" | "no"
    )
}
