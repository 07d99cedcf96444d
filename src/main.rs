use aes::{Aes128, Aes256};
use clap::{Args, Parser, Subcommand, ValueEnum};
use eyre::{ensure, Result, WrapErr};
use sectorcrypt::{
    sector::DEFAULT_SECTOR_SIZE,
    xts::{BlockPrimitive, DispatchPolicy},
    SectorCipher, XtsConfig, XtsContext, XtsStandard,
};
use sm4::Sm4;
use std::path::PathBuf;
use tracing::trace;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use zeroize::Zeroizing;

fn decode_key(s: &str) -> Result<Zeroizing<Vec<u8>>> {
    Ok(Zeroizing::new(hex::decode(s.trim())?))
}

#[derive(Clone, Copy, ValueEnum)]
enum CipherKind {
    Sm4,
    Aes128,
    Aes256,
}

#[derive(Args)]
struct CryptArgs {
    /// Data key followed by tweak key, hex encoded
    #[arg(short = 'k', long)]
    key: String,
    #[arg(short = 'c', long, value_enum, default_value_t = CipherKind::Sm4)]
    cipher: CipherKind,
    /// GB or IEEE
    #[arg(short = 's', long, default_value_t = XtsStandard::Gb)]
    standard: XtsStandard,
    #[arg(long, default_value_t = DEFAULT_SECTOR_SIZE)]
    sector_size: usize,
    #[arg(long, default_value_t = 0)]
    first_sector: u64,
    #[arg(long, default_value_t = DispatchPolicy::Auto)]
    dispatch: DispatchPolicy,
    #[arg(long)]
    allow_insecure_decrypt: bool,
    #[arg(index = 1)]
    input: PathBuf,
    #[arg(index = 2)]
    output: PathBuf,
}

#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Encrypt(CryptArgs),
    Decrypt(CryptArgs),
}

fn run<C: BlockPrimitive>(args: &CryptArgs, encrypt: bool) -> Result<()> {
    let key = decode_key(&args.key).wrap_err("Couldn't parse the key")?;
    let mut ctx = XtsContext::<C>::new(XtsConfig {
        dispatch: args.dispatch,
        allow_insecure_decrypt: args.allow_insecure_decrypt,
    });
    ctx.init_combined(&key, args.standard)
        .wrap_err_with(|| format!("Failed to set up {}-XTS", C::NAME))?;
    let cipher = SectorCipher::new(ctx, args.sector_size)?;

    let mut data = std::fs::read(&args.input)
        .wrap_err_with(|| format!("Couldn't read {:?}", args.input))?;
    trace!("Read {} bytes from {:?}", data.len(), args.input);
    if encrypt {
        cipher
            .encrypt_sectors(args.first_sector, &mut data)
            .wrap_err("Encryption failed")?;
    } else {
        cipher
            .decrypt_sectors(args.first_sector, &mut data)
            .wrap_err("Decryption failed")?;
    }
    std::fs::write(&args.output, &data)
        .wrap_err_with(|| format!("Couldn't write {:?}", args.output))?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();
    trace!("Starting up sectorcrypt cli");
    let (args, encrypt) = match &cli.command {
        Command::Encrypt(args) => (args, true),
        Command::Decrypt(args) => (args, false),
    };
    ensure!(args.input.is_file(), "input {:?} does not exist", args.input);
    match args.cipher {
        CipherKind::Sm4 => run::<Sm4>(args, encrypt),
        CipherKind::Aes128 => run::<Aes128>(args, encrypt),
        CipherKind::Aes256 => run::<Aes256>(args, encrypt),
    }
}
