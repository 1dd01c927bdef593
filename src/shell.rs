//! Interactive session over one unlocked vault.

use std::collections::VecDeque;
use std::io::{BufRead, Write};

use anyhow::{Result, bail};
use passlock::clipboard::{Clipboard, Copied};
use passlock::generator::{self, GenerationConfig};
use passlock::{NewRecord, RecordPatch, Session, VaultError, strength};
use zeroize::Zeroizing;

use crate::{auth, output};

const HISTORY_LEN: usize = 5;

const HELP: &str = "\
commands:
  gen [LENGTH]                  generate a password
  history                       last generated passwords
  strength PASSWORD             estimate password strength
  list [FILTER]                 list credentials
  search QUERY                  search credentials
  show ID                       show a credential
  reveal ID                     show a credential with its password
  add TITLE [USERNAME [PASS]]   store a credential (generated password if omitted)
  passwd ID [PASS]              change a credential password (generated if omitted)
  rm ID                         remove a credential
  copy ID                       copy a password to the clipboard
  lock | unlock                 lock or unlock the vault
  help | quit";

/// Most recent first, capped at [`HISTORY_LEN`].
#[derive(Default)]
struct History(VecDeque<Zeroizing<String>>);

impl History {
    fn push(&mut self, password: Zeroizing<String>) {
        if self.0.len() == HISTORY_LEN {
            self.0.pop_back();
        }
        self.0.push_front(password);
    }

    fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|p| p.as_str())
    }
}

enum Flow {
    Continue,
    Quit,
}

pub struct Shell {
    session: Session,
    clipboard: Clipboard,
    history: History,
    copied: Option<Copied>,
}

impl Shell {
    pub fn new(session: Session, clipboard: Clipboard) -> Self {
        Self {
            session,
            clipboard,
            history: History::default(),
            copied: None,
        }
    }

    pub fn run(&mut self, input: impl BufRead, out: &mut impl Write) -> Result<()> {
        writeln!(out, "passlock shell; type 'help' for commands")?;
        prompt(out)?;

        for line in input.lines() {
            let line = Zeroizing::new(line?);
            match self.execute(&line, out) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Quit) => break,
                Err(e) if is_locked(&e) => {
                    writeln!(out, "error: vault is locked; type 'unlock' to continue")?
                }
                Err(e) => writeln!(out, "error: {e:#}")?,
            }
            prompt(out)?;
        }

        self.session.lock();
        if self.copied.take().is_some() {
            let _ = self.clipboard.clear_now();
        }
        Ok(())
    }

    fn execute(&mut self, line: &str, out: &mut impl Write) -> Result<Flow> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(Flow::Continue);
        };
        let args: Vec<&str> = words.collect();

        match (command, args.as_slice()) {
            ("quit" | "exit", _) => return Ok(Flow::Quit),
            ("help", _) => writeln!(out, "{HELP}")?,
            ("gen", rest) => {
                let length = match rest.first() {
                    Some(n) => n.parse()?,
                    None => generator::DEFAULT_LENGTH,
                };
                let password = generator::generate(&GenerationConfig::new(length))?;
                writeln!(out, "{}", password.as_str())?;
                writeln!(out, "{}", strength::score(&password))?;
                self.history.push(password);
            }
            ("history", _) => {
                if self.history.0.is_empty() {
                    writeln!(out, "no passwords generated yet")?;
                }
                for (i, password) in self.history.iter().enumerate() {
                    writeln!(out, "{}. {password}", i + 1)?;
                }
            }
            ("strength", [password]) => writeln!(out, "{}", strength::score(password))?,
            ("list", rest) => {
                let filter = rest.first().copied();
                let table = self
                    .session
                    .with_vault(|v| Ok(output::record_table(&v.list(filter)?)))?;
                write!(out, "{table}")?;
            }
            ("search", [query]) => {
                let table = self
                    .session
                    .with_vault(|v| Ok(output::record_table(&v.search(query)?)))?;
                write!(out, "{table}")?;
            }
            ("show" | "reveal", [id]) => {
                let reveal = command == "reveal";
                let details = self.session.with_vault(|v| {
                    let record = v.get(v.resolve(id)?)?;
                    Ok(output::record_details(record, reveal))
                })?;
                write!(out, "{details}")?;
            }
            ("add", [title, rest @ ..]) if rest.len() <= 2 => {
                let username = rest.first().copied().unwrap_or_default();
                let password = match rest.get(1) {
                    Some(p) => Zeroizing::new(p.to_string()),
                    None => self.generated()?,
                };
                let record = NewRecord::new(title, username, &password);
                let id = self.session.with_vault(|v| v.add(record))?;
                writeln!(out, "stored credential '{title}' ({id})")?;
            }
            ("passwd", [id, rest @ ..]) if rest.len() <= 1 => {
                let password = match rest.first() {
                    Some(p) => Zeroizing::new(p.to_string()),
                    None => self.generated()?,
                };
                let patch = RecordPatch {
                    password: Some(password.as_str().to_string()),
                    ..RecordPatch::default()
                };
                let title = self.session.with_vault(|v| {
                    let id = v.resolve(id)?;
                    Ok(v.update(id, patch)?.title().to_string())
                })?;
                writeln!(out, "password of '{title}' changed")?;
            }
            ("rm", [id]) => {
                let removed = self.session.with_vault(|v| {
                    let id = v.resolve(id)?;
                    v.remove(id)
                })?;
                writeln!(out, "credential '{}' removed", removed.title())?;
            }
            ("copy", [id]) => {
                let (password, timeout) = self.session.with_vault(|v| {
                    let record = v.get(v.resolve(id)?)?;
                    let password = Zeroizing::new(record.password().to_string());
                    Ok((password, v.settings()?.clipboard_timeout()))
                })?;
                self.copied = Some(self.clipboard.copy(&password, timeout)?);
                match timeout {
                    Some(t) => writeln!(out, "copied; clearing in {}s", t.as_secs())?,
                    None => writeln!(out, "copied")?,
                }
            }
            ("lock", _) => {
                self.session.lock();
                writeln!(out, "vault locked")?;
            }
            ("unlock", _) => {
                if self.session.is_unlocked() {
                    writeln!(out, "vault is already unlocked")?;
                } else {
                    let password = auth::prompt_password("Master password: ")?;
                    self.session.unlock(&password)?;
                    writeln!(out, "vault unlocked")?;
                }
            }
            _ => bail!("unknown command or wrong arguments: {command} (try 'help')"),
        }
        Ok(Flow::Continue)
    }

    /// A default-config password, remembered in the history.
    fn generated(&mut self) -> Result<Zeroizing<String>> {
        let password = generator::generate(&GenerationConfig::default())?;
        self.history.push(password.clone());
        Ok(password)
    }
}

fn prompt(out: &mut impl Write) -> Result<()> {
    write!(out, "passlock> ")?;
    out.flush()?;
    Ok(())
}

fn is_locked(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<VaultError>(), Some(VaultError::Locked))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use passlock::clipboard::ClipboardError;
    use passlock::{KdfParams, Storage, Vault};
    use tempfile::{TempDir, tempdir};

    use super::*;

    fn shell() -> (TempDir, Shell) {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("vault.plck"));
        let vault = Vault::create(storage, "pw", KdfParams::pbkdf2(1_000).unwrap()).unwrap();
        let session = Session::with_lock_timeout(vault, None).unwrap();
        let clipboard =
            Clipboard::with_backend(|| Err(ClipboardError::Unavailable("headless".into())));
        (dir, Shell::new(session, clipboard))
    }

    fn run(shell: &mut Shell, script: &str) -> String {
        let mut out = Vec::new();
        shell.run(Cursor::new(script.to_string()), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn history_keeps_last_five() {
        let mut history = History::default();
        for i in 0..7 {
            history.push(Zeroizing::new(i.to_string()));
        }
        let kept: Vec<&str> = history.iter().collect();
        assert_eq!(kept, vec!["6", "5", "4", "3", "2"]);
    }

    #[test]
    fn gen_prints_password_and_records_history() {
        let (_dir, mut shell) = shell();
        let out = run(&mut shell, "gen 12\ngen\nhistory\n");

        let first = shell.history.iter().nth(1).unwrap().to_string();
        assert_eq!(first.chars().count(), 12);
        assert_eq!(shell.history.0.len(), 2);
        assert!(out.contains(&format!("2. {first}")));
    }

    #[test]
    fn gen_with_huge_length_reports_error() {
        let (_dir, mut shell) = shell();
        let out = run(&mut shell, "gen 99999999999\nquit\n");
        assert!(out.contains("error: length must be at most"));
        assert_eq!(shell.history.0.len(), 0);
    }

    #[test]
    fn add_list_and_remove() {
        let (_dir, mut shell) = shell();
        let id = shell
            .session
            .with_vault(|v| v.add(NewRecord::new("Bank", "me", "p")))
            .unwrap();

        let script = format!(
            "add Example u p\nadd Generated\nlist\nsearch gener\nrm {}\nlist\nquit\n",
            &id.to_string()[..8]
        );
        let out = run(&mut shell, &script);

        assert!(out.contains("stored credential 'Example'"));
        assert!(out.contains("stored credential 'Generated'"));
        assert!(out.contains("credential 'Bank' removed"));
        assert_eq!(shell.history.0.len(), 1);
        assert!(!shell.session.is_unlocked());
    }

    #[test]
    fn unlock_when_already_unlocked() {
        let (_dir, mut shell) = shell();
        let out = run(&mut shell, "unlock\n");
        assert!(out.contains("already unlocked"));
    }

    #[test]
    fn locked_vault_reports_error() {
        let (_dir, mut shell) = shell();
        let out = run(&mut shell, "lock\nlist\n");
        assert!(out.contains("vault locked"));
        assert!(out.contains("error: vault is locked"));
    }

    #[test]
    fn unknown_command_is_reported() {
        let (_dir, mut shell) = shell();
        let out = run(&mut shell, "frobnicate\n\nquit\n");
        assert!(out.contains("unknown command"));
    }

    #[test]
    fn copy_without_clipboard_fails_cleanly() {
        let (_dir, mut shell) = shell();
        let id = shell
            .session
            .with_vault(|v| v.add(NewRecord::new("Example", "u", "p")))
            .unwrap();

        let out = run(&mut shell, &format!("copy {id}\n"));
        assert!(out.contains("error: clipboard unavailable"));
    }
}
