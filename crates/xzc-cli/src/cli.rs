use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use xzc_chaincfg::Network;

#[derive(Parser)]
#[command(
    name = "xzcdb",
    about = "Inspect and maintain an xzc node block store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Root data directory; each network keeps its own directory inside it
    #[arg(long, global = true)]
    pub datadir: Option<PathBuf>,

    /// mainnet, testnet or regtest
    #[arg(long, global = true)]
    pub network: Option<Network>,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Maintain the transaction-by-hash index
    #[arg(long, global = true)]
    pub txindex: bool,

    /// Maintain the transaction-by-address index (implies --txindex)
    #[arg(long, global = true)]
    pub addrindex: bool,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the block store for the selected network
    Init,
    /// Show the best block, block files and index tips
    Info,
    /// Import hex-encoded blocks, one per line, on top of the current tip
    Import(ImportArgs),
    /// Show a stored block
    Block(BlockArgs),
    /// Look up a transaction through the transaction index
    Tx(TxArgs),
    /// List transactions paying or spending an output script
    Addr(AddrArgs),
    /// Drop and rebuild every enabled index
    Reindex,
    /// Delete an index and the indexes built on it
    DropIndex(DropIndexArgs),
    /// Read back every stored block and check its integrity
    Verify,
}

#[derive(Args)]
pub struct ImportArgs {
    pub path: PathBuf,
}

#[derive(Args)]
pub struct BlockArgs {
    pub hash: String,
    /// Print the serialized block as hex
    #[arg(long)]
    pub raw: bool,
}

#[derive(Args)]
pub struct TxArgs {
    pub txid: String,
}

#[derive(Args)]
pub struct AddrArgs {
    /// Base58 address of the selected network, or an output script in hex
    pub address: String,
    #[arg(long, default_value = "0")]
    pub skip: usize,
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
    /// Newest first
    #[arg(long)]
    pub reverse: bool,
}

#[derive(Args)]
pub struct DropIndexArgs {
    pub name: String,
}
