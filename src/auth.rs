use anyhow::{Result, bail};
use std::io::{self, BufRead, IsTerminal};
use zeroize::Zeroizing;

pub const PASSWORD_ENV: &str = "PASSLOCK_PASSWORD";
/// New master passphrase for `passwd`.
pub const NEW_PASSWORD_ENV: &str = "PASSLOCK_NEW_PASSWORD";

/// Master passphrase for an existing vault.
///
/// Sources, in order: `PASSLOCK_PASSWORD`, one line of piped stdin, an
/// interactive prompt.
pub fn read_password() -> Result<Zeroizing<String>> {
    //  PASSLOCK_PASSWORD="supersecret" passlock list
    if let Some(pw) = from_env(PASSWORD_ENV) {
        return Ok(pw);
    }

    //  printf "%s\n" "$PW" | passlock list
    if !io::stdin().is_terminal() {
        let mut buf = Zeroizing::new(String::new());
        io::stdin().read_line(&mut buf)?;
        trim_newline(&mut buf);

        if !buf.is_empty() {
            return Ok(buf);
        }
    } else {
        let pw = Zeroizing::new(rpassword::prompt_password("Master password: ")?);
        if !pw.is_empty() {
            return Ok(pw);
        }
    }

    bail!("No password provided")
}

/// New master passphrase, confirmed twice when interactive.
pub fn read_new_password_with_confirmation(env: &str) -> Result<Zeroizing<String>> {
    if let Some(pw) = from_env(env) {
        return Ok(pw);
    }

    let (pw1, pw2) = if io::stdin().is_terminal() {
        (
            Zeroizing::new(rpassword::prompt_password("New master password: ")?),
            Zeroizing::new(rpassword::prompt_password("Confirm master password: ")?),
        )
    } else {
        let stdin = io::stdin();
        let mut handle = stdin.lock();

        let mut pw1 = Zeroizing::new(String::new());
        let mut pw2 = Zeroizing::new(String::new());
        handle.read_line(&mut pw1)?;
        handle.read_line(&mut pw2)?;
        trim_newline(&mut pw1);
        trim_newline(&mut pw2);
        (pw1, pw2)
    };

    if pw1.is_empty() {
        bail!("password cannot be empty");
    }

    if pw1 != pw2 {
        bail!("passwords do not match");
    }

    Ok(pw1)
}

/// A line typed at a prompt, for shell commands that ask for the passphrase
/// again after an auto-lock.
pub fn prompt_password(prompt: &str) -> Result<Zeroizing<String>> {
    if let Some(pw) = from_env(PASSWORD_ENV) {
        return Ok(pw);
    }
    Ok(Zeroizing::new(rpassword::prompt_password(prompt)?))
}

fn from_env(name: &str) -> Option<Zeroizing<String>> {
    std::env::var(name)
        .ok()
        .filter(|pw| !pw.is_empty())
        .map(Zeroizing::new)
}

fn trim_newline(s: &mut String) {
    while s.ends_with('\n') || s.ends_with('\r') {
        s.pop();
    }
}
