use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
mod auth;
mod output;
mod shell;
use passlock::clipboard::Clipboard;
use passlock::crypto::kdf;
use passlock::generator::{self, CharClass, GenerationConfig};
use passlock::{
    KdfParams, NewRecord, RecordPatch, Session, Storage, Vault, default_storage, strength,
};
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KdfKind {
    Pbkdf2,
    Argon2id,
}

#[derive(Debug, clap::Args)]
struct KdfArgs {
    /// Key derivation function (default: pbkdf2)
    #[arg(long, value_enum)]
    kdf: Option<KdfKind>,

    /// PBKDF2 iteration count (default: 100000)
    #[arg(long)]
    iterations: Option<u32>,

    /// Argon2 memory cost in KiB (default: 65536)
    #[arg(long = "argon-mem")]
    mem_cost_kib: Option<u32>,

    /// Argon2 time cost / iterations (default: 3)
    #[arg(long = "argon-time")]
    time_cost: Option<u32>,

    /// Argon2 parallelism (default: 1)
    #[arg(long = "argon-parallelism")]
    parallelism: Option<u32>,
}

impl KdfArgs {
    fn is_empty(&self) -> bool {
        self.kdf.is_none()
            && self.iterations.is_none()
            && self.mem_cost_kib.is_none()
            && self.time_cost.is_none()
            && self.parallelism.is_none()
    }

    fn to_kdf_params(&self) -> Result<KdfParams> {
        let argon_flags =
            self.mem_cost_kib.is_some() || self.time_cost.is_some() || self.parallelism.is_some();
        let kind = match self.kdf {
            Some(kind) => kind,
            None if argon_flags => KdfKind::Argon2id,
            None => KdfKind::Pbkdf2,
        };

        let params = match kind {
            KdfKind::Pbkdf2 => {
                if argon_flags {
                    bail!("argon2 options require --kdf argon2id");
                }
                KdfParams::pbkdf2(self.iterations.unwrap_or(kdf::DEFAULT_PBKDF2_ITERATIONS))?
            }
            KdfKind::Argon2id => {
                if self.iterations.is_some() {
                    bail!("--iterations only applies to --kdf pbkdf2");
                }
                KdfParams::argon2id(
                    self.mem_cost_kib.unwrap_or(kdf::DEFAULT_ARGON2_MEM_KIB),
                    self.time_cost.unwrap_or(kdf::DEFAULT_ARGON2_TIME),
                    self.parallelism.unwrap_or(kdf::DEFAULT_ARGON2_PARALLELISM),
                )?
            }
        };
        Ok(params)
    }
}

#[derive(Debug, clap::Args)]
struct GenerateArgs {
    /// Password length
    #[arg(short, long, default_value_t = generator::DEFAULT_LENGTH)]
    length: usize,

    /// Leave out uppercase letters
    #[arg(long)]
    no_upper: bool,

    /// Leave out lowercase letters
    #[arg(long)]
    no_lower: bool,

    /// Leave out digits
    #[arg(long)]
    no_digits: bool,

    /// Leave out symbols
    #[arg(long)]
    no_symbols: bool,

    /// Characters never to use
    #[arg(long, value_name = "CHARS", default_value = "")]
    exclude: String,

    /// Skip look-alike characters such as 0/O and 1/l/I
    #[arg(long)]
    avoid_ambiguous: bool,

    /// Do not force at least one character of every selected type
    #[arg(long)]
    no_require_all: bool,
}

impl GenerateArgs {
    fn to_config(&self) -> GenerationConfig {
        let classes: Vec<CharClass> = [
            (!self.no_upper, CharClass::Upper),
            (!self.no_lower, CharClass::Lower),
            (!self.no_digits, CharClass::Digit),
            (!self.no_symbols, CharClass::Symbol),
        ]
        .into_iter()
        .filter_map(|(enabled, class)| enabled.then_some(class))
        .collect();

        GenerationConfig::new(self.length)
            .with_classes(&classes)
            .excluding(&self.exclude)
            .avoiding_ambiguous(self.avoid_ambiguous)
            .requiring_all_classes(!self.no_require_all)
    }
}

fn resolve_storage(path: Option<PathBuf>) -> Result<Storage> {
    match path {
        Some(p) => Ok(Storage::new(p)),
        None => default_storage().context("could not determine a data directory for the vault"),
    }
}

fn open_vault(store: Option<PathBuf>) -> Result<Vault> {
    let storage = resolve_storage(store)?;
    let password = auth::read_password()?;
    Ok(Vault::open(storage, &password)?)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("PASSLOCK_LOG")
        .unwrap_or_else(|_| EnvFilter::new("passlock=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

#[derive(Debug, Parser)]
#[command(name = "passlock")]
#[command(
    version,
    about = "Offline password generator and encrypted credential vault."
)]
struct Cli {
    /// Path to the vault file
    #[arg(long, global = true, value_name = "PATH", env = "PASSLOCK_PATH")]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Creates a new empty vault
    Init {
        #[command(flatten)]
        kdf: KdfArgs,
    },

    /// Generates random passwords
    Generate {
        #[command(flatten)]
        options: GenerateArgs,

        /// Number of passwords
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
    },

    /// Estimates the strength of a password (read from stdin when omitted)
    Strength { password: Option<String> },

    /// Stores a new credential; generates the password unless one is given
    #[command(arg_required_else_help = true)]
    Add {
        title: String,

        #[arg(short, long, default_value = "")]
        username: String,

        #[arg(short, long)]
        password: Option<String>,

        #[arg(long)]
        url: Option<String>,

        #[arg(long)]
        notes: Option<String>,

        #[command(flatten)]
        generate: GenerateArgs,
    },

    /// Changes fields of a credential
    #[command(arg_required_else_help = true)]
    Update {
        /// Credential id or unique id prefix
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(short, long)]
        username: Option<String>,

        #[arg(short, long, conflicts_with = "regenerate")]
        password: Option<String>,

        /// Replace the password with a freshly generated one
        #[arg(long)]
        regenerate: bool,

        #[arg(long, conflicts_with = "clear_url")]
        url: Option<String>,

        #[arg(long)]
        clear_url: bool,

        #[arg(long, conflicts_with = "clear_notes")]
        notes: Option<String>,

        #[arg(long)]
        clear_notes: bool,
    },

    /// Removes a credential
    #[command(arg_required_else_help = true)]
    Remove { id: String },

    /// Lists credentials, optionally filtered
    List { filter: Option<String> },

    /// Searches title, username, url and notes
    #[command(arg_required_else_help = true)]
    Search { query: String },

    /// Shows one credential
    #[command(arg_required_else_help = true)]
    Show {
        id: String,

        /// Print the password in clear text
        #[arg(long)]
        reveal: bool,
    },

    /// Copies a password to the clipboard and clears it after the timeout
    #[command(arg_required_else_help = true)]
    Copy {
        id: String,

        /// Copy the username instead of the password
        #[arg(long)]
        username: bool,
    },

    /// Shows or changes vault settings
    Settings {
        #[arg(long)]
        auto_lock: Option<bool>,

        /// Seconds of inactivity before the shell locks the vault
        #[arg(long, value_name = "SECS")]
        lock_timeout: Option<u64>,

        #[arg(long)]
        clipboard_clear: Option<bool>,

        /// Seconds before a copied password is cleared
        #[arg(long, value_name = "SECS")]
        clipboard_timeout: Option<u64>,
    },

    /// Changes the master password
    Passwd {
        #[command(flatten)]
        kdf: KdfArgs,
    },

    /// Shows information about the vault
    Info,

    /// Interactive session with auto-lock
    Shell,
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_tracing();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Cli) -> Result<()> {
    match args.command {
        Commands::Init { kdf } => {
            let kdf = kdf.to_kdf_params()?;
            let storage = resolve_storage(args.store)?;
            if storage.exists() {
                bail!("vault already exists at {}", storage.path().display());
            }
            let password = auth::read_new_password_with_confirmation(auth::PASSWORD_ENV)?;
            let vault = Vault::create(storage, &password, kdf)?;
            println!("vault initialized at {}", vault.storage().path().display());
        }
        Commands::Generate { options, count } => {
            let config = options.to_config();
            for password in generator::generate_batch(&config, count)? {
                println!("{}", password.as_str());
                eprintln!("{}", strength::score(&password));
            }
        }
        Commands::Strength { password } => {
            let password = match password {
                Some(p) => Zeroizing::new(p),
                None => read_checked_password()?,
            };
            println!("{}", strength::score(&password));
        }
        Commands::Add {
            title,
            username,
            password,
            url,
            notes,
            generate,
        } => {
            let mut vault = open_vault(args.store)?;
            let generated = password.is_none();
            let password = match password {
                Some(p) => Zeroizing::new(p),
                None => generator::generate(&generate.to_config())?,
            };

            let mut record = NewRecord::new(&title, &username, &password);
            record.url = url;
            record.notes = notes;
            let id = vault.add(record)?;

            println!("stored credential '{title}' ({id})");
            if generated {
                let score = strength::score(&password);
                println!("generated password strength: {score}");
            }
        }
        Commands::Update {
            id,
            title,
            username,
            password,
            regenerate,
            url,
            clear_url,
            notes,
            clear_notes,
        } => {
            let password = if regenerate {
                let generated = generator::generate(&GenerationConfig::default())?;
                Some(generated.as_str().to_string())
            } else {
                password
            };
            let patch = RecordPatch {
                title,
                username,
                password,
                url: if clear_url { Some(None) } else { url.map(Some) },
                notes: if clear_notes { Some(None) } else { notes.map(Some) },
            };
            if patch.is_empty() {
                bail!("nothing to update");
            }

            let mut vault = open_vault(args.store)?;
            let id = vault.resolve(&id)?;
            let record = vault.update(id, patch)?;
            println!("credential '{}' updated", record.title());
        }
        Commands::Remove { id } => {
            let mut vault = open_vault(args.store)?;
            let id = vault.resolve(&id)?;
            let removed = vault.remove(id)?;
            println!("credential '{}' removed", removed.title());
        }
        Commands::List { filter } => {
            let vault = open_vault(args.store)?;
            print!("{}", output::record_table(&vault.list(filter.as_deref())?));
        }
        Commands::Search { query } => {
            let vault = open_vault(args.store)?;
            print!("{}", output::record_table(&vault.search(&query)?));
        }
        Commands::Show { id, reveal } => {
            let vault = open_vault(args.store)?;
            let record = vault.get(vault.resolve(&id)?)?;
            print!("{}", output::record_details(record, reveal));
        }
        Commands::Copy { id, username } => {
            let vault = open_vault(args.store)?;
            let record = vault.get(vault.resolve(&id)?)?;
            let settings = vault.settings()?;
            let value = Zeroizing::new(if username {
                record.username().to_string()
            } else {
                record.password().to_string()
            });

            let clipboard = Clipboard::system();
            let copied = clipboard.copy(&value, settings.clipboard_timeout())?;

            if !copied.clears() {
                println!("copied '{}' to clipboard", record.title());
                return Ok(());
            }

            let on_interrupt = clipboard.clone();
            ctrlc::set_handler(move || {
                let _ = on_interrupt.clear_now();
                std::process::exit(130);
            })
            .context("failed to install Ctrl-C handler")?;

            println!(
                "copied '{}' to clipboard; clearing in {}s (Ctrl-C clears now)",
                record.title(),
                settings.clipboard_timeout_secs
            );
            drop(vault);
            copied.wait();
        }
        Commands::Settings {
            auto_lock,
            lock_timeout,
            clipboard_clear,
            clipboard_timeout,
        } => {
            let mut vault = open_vault(args.store)?;
            let mut settings = vault.settings()?;
            let changed = auto_lock.is_some()
                || lock_timeout.is_some()
                || clipboard_clear.is_some()
                || clipboard_timeout.is_some();

            if let Some(v) = auto_lock {
                settings.auto_lock = v;
            }
            if let Some(v) = lock_timeout {
                settings.lock_timeout_secs = v;
            }
            if let Some(v) = clipboard_clear {
                settings.clipboard_clear = v;
            }
            if let Some(v) = clipboard_timeout {
                settings.clipboard_timeout_secs = v;
            }
            if changed {
                vault.update_settings(settings)?;
            }

            println!("auto_lock:          {}", settings.auto_lock);
            println!("lock_timeout:       {}s", settings.lock_timeout_secs);
            println!("clipboard_clear:    {}", settings.clipboard_clear);
            println!("clipboard_timeout:  {}s", settings.clipboard_timeout_secs);
        }
        Commands::Passwd { kdf } => {
            let mut vault = open_vault(args.store)?;
            let kdf = if kdf.is_empty() {
                vault.info()?.kdf
            } else {
                kdf.to_kdf_params()?
            };
            let new_password = auth::read_new_password_with_confirmation(auth::NEW_PASSWORD_ENV)?;
            vault.change_passphrase(&new_password, kdf)?;
            println!("master password changed");
        }
        Commands::Info => {
            let vault = open_vault(args.store)?;
            println!("{}", vault.info()?);
        }
        Commands::Shell => {
            let vault = open_vault(args.store)?;
            let session = Session::new(vault)?;
            let mut shell = shell::Shell::new(session, Clipboard::system());
            let stdin = io::stdin();
            shell.run(stdin.lock(), &mut io::stdout())?;
        }
    }

    Ok(())
}

fn read_checked_password() -> Result<Zeroizing<String>> {
    if io::stdin().is_terminal() {
        return Ok(Zeroizing::new(rpassword::prompt_password(
            "Password to check: ",
        )?));
    }
    let mut buf = Zeroizing::new(String::new());
    io::stdin().read_to_string(&mut buf)?;
    let trimmed = buf.trim_end_matches(['\n', '\r']).len();
    buf.truncate(trimmed);
    Ok(buf)
}
