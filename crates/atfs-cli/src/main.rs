//! atfs: per-file encrypted storage CLI
//!
//! Commands:
//!   keygen              - create an RSA key pair, seal the private key into the vault
//!   encrypt <file>      - encrypt a file into the store as <hex>.at
//!   decrypt <name>      - decrypt a stored container
//!   share <name>        - give another user access to a container
//!   unshare <name>      - take a user's access away again
//!   info <name>         - show container headers
//!   ls                  - list stored containers
//!   rm <name>           - overwrite and delete a container
//!   config show         - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};

use atfs_core::config::expand_home;
use atfs_core::{AtfsConfig, UserId};
use atfs_crypto::{
    container, keys, CipherId, EncryptedContainer, HashId, KeyPair, RsaPublicKey, VaultParams,
};
use atfs_storage::LocalStore;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "atfs",
    version,
    about = "Per-file encrypted storage",
    long_about = "atfs: encrypt files into self-describing .at containers, share them with \
                  other users' public keys, and keep your private key hidden in a haystack vault"
)]
struct Cli {
    /// Path to the atfs configuration file
    #[arg(
        long,
        short = 'c',
        env = "ATFS_CONFIG",
        default_value = "~/.config/atfs/config.toml"
    )]
    config: PathBuf,

    /// Numeric id of the acting user
    #[arg(long, short = 'u', env = "ATFS_USER", global = true)]
    user: Option<u32>,

    /// Log level filter (RUST_LOG takes precedence)
    #[arg(long, env = "ATFS_LOG", global = true)]
    log: Option<String>,

    /// Log output format
    #[arg(long, value_enum, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum, PartialEq)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a key pair and seal the private key into the vault
    Keygen {
        /// RSA modulus size (default: crypto.rsa_bits)
        #[arg(long)]
        bits: Option<usize>,
        /// Replace an existing vault
        #[arg(long)]
        force: bool,
    },

    /// Encrypt a local file into the store
    Encrypt {
        /// Local file to encrypt
        file: PathBuf,
        /// Cipher identifier, e.g. AES-256-CBC (default: crypto.default_cipher)
        #[arg(long)]
        cipher: Option<String>,
        /// Hash identifier, e.g. SHA256 (default: crypto.default_hash)
        #[arg(long)]
        hash: Option<String>,
        /// Name recorded inside the container (default: the file's name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Decrypt a stored container
    Decrypt {
        /// Stored name (<hex>.at)
        name: String,
        /// Owner's public key PEM (needed when decrypting someone else's file)
        #[arg(long)]
        owner_key: Option<PathBuf>,
        /// Output path (default: the original file name in the current directory)
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },

    /// Grant another user access to one of your containers
    Share {
        name: String,
        /// Recipient user id
        #[arg(long)]
        recipient: u32,
        /// Recipient's public key PEM
        #[arg(long)]
        recipient_key: PathBuf,
    },

    /// Revoke a user's access (the payload is not re-encrypted)
    Unshare {
        name: String,
        /// Recipient user id
        #[arg(long)]
        recipient: u32,
    },

    /// Show container headers without decrypting
    Info {
        name: String,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List stored containers
    Ls,

    /// Overwrite a container with random bytes and delete it
    Rm { name: String },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Where the vault password comes from.
enum PasswordSource {
    Prompt,
    Fixed(SecretString),
}

struct Ctx {
    config: AtfsConfig,
    user: Option<UserId>,
    password: PasswordSource,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_home(&cli.config);
    let config = AtfsConfig::load(&config_path)
        .with_context(|| format!("loading config: {}", config_path.display()))?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli.log_format.clone().unwrap_or(match config.log.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, &format);
    if !config_path.exists() {
        tracing::warn!("config file not found: {}  (using defaults)", config_path.display());
    }

    let ctx = Ctx {
        config,
        user: cli.user.map(UserId),
        password: match std::env::var("ATFS_PASSWORD") {
            Ok(pw) => PasswordSource::Fixed(SecretString::from(pw)),
            Err(_) => PasswordSource::Prompt,
        },
    };

    match cli.command {
        Commands::Keygen { bits, force } => cmd_keygen(&ctx, bits, force),
        Commands::Encrypt {
            file,
            cipher,
            hash,
            name,
        } => cmd_encrypt(&ctx, &file, cipher.as_deref(), hash.as_deref(), name.as_deref()),
        Commands::Decrypt {
            name,
            owner_key,
            out,
        } => cmd_decrypt(&ctx, &name, owner_key.as_deref(), out.as_deref()),
        Commands::Share {
            name,
            recipient,
            recipient_key,
        } => cmd_share(&ctx, &name, UserId(recipient), &recipient_key),
        Commands::Unshare { name, recipient } => cmd_unshare(&ctx, &name, UserId(recipient)),
        Commands::Info { name, json } => cmd_info(&ctx, &name, json),
        Commands::Ls => cmd_ls(&ctx),
        Commands::Rm { name } => cmd_rm(&ctx, &name),
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&ctx.config, &config_path),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Shared helpers ────────────────────────────────────────────────────────────

impl Ctx {
    fn user(&self) -> Result<UserId> {
        self.user.context("no acting user; pass --user or set ATFS_USER")
    }

    fn password(&self, prompt: &str) -> Result<SecretString> {
        match &self.password {
            PasswordSource::Fixed(pw) => Ok(SecretString::from(pw.expose_secret().to_owned())),
            PasswordSource::Prompt => rpassword::prompt_password(prompt)
                .map(SecretString::from)
                .context("reading password"),
        }
    }

    fn store(&self) -> Result<LocalStore> {
        let root = expand_home(&self.config.storage.root);
        LocalStore::open(&root, self.config.storage.quota_bytes)
            .with_context(|| format!("opening store: {}", root.display()))
    }

    fn vault_path(&self) -> PathBuf {
        expand_home(&self.config.vault.path)
    }

    fn public_key_path(&self) -> PathBuf {
        expand_home(&self.config.vault.public_key_path)
    }

    /// Reveal and decrypt the acting user's private key.
    fn unlock(&self) -> Result<KeyPair> {
        let path = self.vault_path();
        let vault = atfs_storage::read_vault(&path).with_context(|| {
            format!("reading vault: {}  (run `atfs keygen` first)", path.display())
        })?;
        let password = self.password("Vault password: ")?;
        atfs_crypto::open_private_key(&vault, &password).context("unlocking private key")
    }

    /// Fail unless the acting user owns the stored container.
    fn require_owner(&self, bytes: &[u8]) -> Result<UserId> {
        let user = self.user()?;
        let owner = container::owner_id_of(bytes)?;
        if owner != user {
            anyhow::bail!("only the owner (user {owner}) can do this; you are user {user}");
        }
        Ok(user)
    }
}

fn read_public_key(path: &Path) -> Result<RsaPublicKey> {
    let pem = std::fs::read_to_string(path)
        .with_context(|| format!("reading public key: {}", path.display()))?;
    keys::public_key_from_pem(&pem)
        .with_context(|| format!("parsing public key: {}", path.display()))
}

/// Keep only the final component of a decrypted name so a container cannot
/// write outside the current directory.
fn output_path_for(name: &str) -> Result<PathBuf> {
    Path::new(name)
        .file_name()
        .map(PathBuf::from)
        .with_context(|| format!("decrypted name {name:?} is not a usable file name"))
}

// ── `atfs keygen` ─────────────────────────────────────────────────────────────

fn cmd_keygen(ctx: &Ctx, bits: Option<usize>, force: bool) -> Result<()> {
    let vault_path = ctx.vault_path();
    if vault_path.exists() && !force {
        anyhow::bail!(
            "vault already exists: {}  (use --force to replace it)",
            vault_path.display()
        );
    }

    let bits = bits.unwrap_or(ctx.config.crypto.rsa_bits);
    println!("Generating {bits}-bit RSA key pair...");
    let pair = KeyPair::generate(bits)?;

    let password = ctx.password("New vault password: ")?;
    if let PasswordSource::Prompt = ctx.password {
        let again = ctx.password("Repeat vault password: ")?;
        if password.expose_secret() != again.expose_secret() {
            anyhow::bail!("passwords do not match");
        }
    }

    let capacity = ctx.config.vault.capacity_bytes;
    let available = atfs_storage::vault_capacity(&vault_path, capacity)?;
    let vault = atfs_crypto::seal_private_key(
        &pair,
        &password,
        available,
        &VaultParams::from_config(&ctx.config),
    )?;
    // capacity is checked again at write time
    atfs_storage::write_vault(&vault_path, &vault, capacity)
        .with_context(|| format!("writing vault: {}", vault_path.display()))?;

    let pub_path = ctx.public_key_path();
    if let Some(parent) = pub_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(&pub_path, pair.public_pem()?)
        .with_context(|| format!("writing public key: {}", pub_path.display()))?;

    println!("  vault:      {} ({})", vault_path.display(), fmt_bytes(vault.len() as u64));
    println!("  public key: {}", pub_path.display());
    Ok(())
}

// ── `atfs encrypt` / `atfs decrypt` ───────────────────────────────────────────

fn cmd_encrypt(
    ctx: &Ctx,
    file: &Path,
    cipher: Option<&str>,
    hash: Option<&str>,
    name: Option<&str>,
) -> Result<()> {
    let user = ctx.user()?;
    let cipher = CipherId::parse(cipher.unwrap_or(&ctx.config.crypto.default_cipher))?;
    let hash = HashId::parse(hash.unwrap_or(&ctx.config.crypto.default_hash))?;
    let name = match name {
        Some(n) => n.to_string(),
        None => file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("no file name in {}", file.display()))?,
    };

    let size = std::fs::metadata(file)
        .with_context(|| format!("reading {}", file.display()))?
        .len();
    container::check_payload_len(size)?;
    let content = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;

    let store = ctx.store()?;
    let pair = ctx.unlock()?;
    let bytes = container::encrypt(&content, &name, user, &pair, cipher, hash)?;
    let stored = store.put(&bytes)?;

    println!("Encrypted {} → {}", file.display(), stored);
    println!("  cipher: {cipher}  hash: {hash}");
    println!("  bytes:  {} → {}", fmt_bytes(size), fmt_bytes(bytes.len() as u64));
    Ok(())
}

fn cmd_decrypt(ctx: &Ctx, name: &str, owner_key: Option<&Path>, out: Option<&Path>) -> Result<()> {
    let user = ctx.user()?;
    let store = ctx.store()?;
    let mut sealed = EncryptedContainer::parse(&store.get(name)?)?;

    let pair = ctx.unlock()?;
    let owner_public = match owner_key {
        Some(path) => read_public_key(path)?,
        None if sealed.owner_id() == user => pair.public().clone(),
        None => anyhow::bail!(
            "{name} belongs to user {}; pass --owner-key with their public key",
            sealed.owner_id()
        ),
    };

    let (content, file_name) = sealed.open(user, pair.private(), &owner_public)?;
    let out = match out {
        Some(p) => p.to_path_buf(),
        None => output_path_for(&file_name)?,
    };
    std::fs::write(&out, &content).with_context(|| format!("writing {}", out.display()))?;

    sealed.info_mut().touch_read(user);
    store.replace(name, &sealed.to_bytes()?)?;

    println!("Decrypted {name} → {}", out.display());
    println!("  bytes: {}", fmt_bytes(content.len() as u64));
    Ok(())
}

// ── `atfs share` / `atfs unshare` ─────────────────────────────────────────────

fn cmd_share(ctx: &Ctx, name: &str, recipient: UserId, recipient_key: &Path) -> Result<()> {
    let store = ctx.store()?;
    let bytes = store.get(name)?;
    ctx.require_owner(&bytes)?;

    let recipient_public = read_public_key(recipient_key)?;
    let pair = ctx.unlock()?;
    let updated = container::share(&bytes, pair.private(), recipient, &recipient_public)?;
    store.replace(name, &updated)?;

    println!("Shared {name} with user {recipient}");
    Ok(())
}

fn cmd_unshare(ctx: &Ctx, name: &str, recipient: UserId) -> Result<()> {
    let store = ctx.store()?;
    let bytes = store.get(name)?;
    ctx.require_owner(&bytes)?;

    let (updated, removed) = container::unshare(&bytes, recipient)?;
    if removed {
        store.replace(name, &updated)?;
        println!("Revoked user {recipient} from {name}");
        println!("  note: the payload was not re-encrypted");
    } else {
        println!("User {recipient} had no access to {name}");
    }
    Ok(())
}

// ── `atfs info` / `atfs ls` / `atfs rm` ───────────────────────────────────────

fn cmd_info(ctx: &Ctx, name: &str, json: bool) -> Result<()> {
    let store = ctx.store()?;
    let bytes = store.get(name)?;
    let sealed = EncryptedContainer::parse(&bytes)?;
    let info = sealed.info();
    let sd = sealed.descriptor();
    let recipients: Vec<u32> = sd.recipients().map(|id| id.0).collect();

    if json {
        let stamp = |s: atfs_core::Stamp| serde_json::json!({ "at_ms": s.at_ms, "by": s.by.0 });
        let value = serde_json::json!({
            "name": name,
            "size": bytes.len(),
            "owner": info.owner().0,
            "created": stamp(info.created()),
            "altered": stamp(info.altered()),
            "read": stamp(info.read()),
            "cipher": sd.cipher().to_string(),
            "hash": sd.hash().name(),
            "recipients": recipients,
            "ciphertext_len": sealed.data().ciphertext().len(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Container: {name}");
    println!("  size:       {}", fmt_bytes(bytes.len() as u64));
    println!("  owner:      user {}", info.owner());
    for (label, s) in [
        ("created", info.created()),
        ("altered", info.altered()),
        ("read", info.read()),
    ] {
        println!("  {label:<10}  {} ms by user {}", s.at_ms, s.by);
    }
    println!("  cipher:     {}", sd.cipher());
    println!("  hash:       {} ({:?})", sd.hash(), sd.hash().family());
    if recipients.is_empty() {
        println!("  shared:     no");
    } else {
        let list: Vec<String> = recipients.iter().map(u32::to_string).collect();
        println!("  shared:     users {}", list.join(", "));
    }
    Ok(())
}

fn cmd_ls(ctx: &Ctx) -> Result<()> {
    let store = ctx.store()?;
    let names = store.list()?;
    if names.is_empty() {
        println!("(no containers in {})", store.root().display());
        return Ok(());
    }
    for name in &names {
        let bytes = store.get(name)?;
        match container::owner_id_of(&bytes) {
            Ok(owner) => println!("{name}  {:>10}  owner {owner}", fmt_bytes(bytes.len() as u64)),
            Err(e) => println!("{name}  (unreadable: {e})"),
        }
    }
    println!();
    println!("{} containers", names.len());
    Ok(())
}

fn cmd_rm(ctx: &Ctx, name: &str) -> Result<()> {
    let store = ctx.store()?;
    let bytes = store.get(name)?;
    ctx.require_owner(&bytes)?;
    store.remove(name)?;
    println!("Removed {name}");
    Ok(())
}

// ── `atfs config show` ────────────────────────────────────────────────────────

fn cmd_config_show(config: &AtfsConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
