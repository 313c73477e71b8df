use std::io::BufRead;
use std::sync::atomic::AtomicBool;

use anyhow::{bail, Context};
use colored::Colorize;
use serde_json::json;
use tracing::{debug, info};
use xzc_chaincfg::{NetworkRegistry, Params};
use xzc_db::{BestState, DbError, Store, Tx};
use xzc_index::{
    fetch_spent_outputs, index_tips, AddrIndex, ChainView, IndexConfig, IndexError, IndexManager,
    IndexResult, InitReport, StoreChain, TxIndex, TX_INDEX_NAME,
};
use xzc_types::{extract_address_keys, AddressKey, Block, ChainBlock, Hash};

use crate::cli::*;
use crate::config::NodeConfig;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = NodeConfig::resolve(&cli)?;
    let format = cli.format;
    match cli.command {
        Command::Init => cmd_init(&config),
        Command::Info => cmd_info(&config, format),
        Command::Import(args) => cmd_import(&config, args),
        Command::Block(args) => cmd_block(&config, args, format),
        Command::Tx(args) => cmd_tx(&config, args, format),
        Command::Addr(args) => cmd_addr(&config, args),
        Command::Reindex => cmd_reindex(&config),
        Command::DropIndex(args) => cmd_drop_index(&config, args),
        Command::Verify => cmd_verify(&config),
    }
}

fn open_store(config: &NodeConfig) -> anyhow::Result<Store> {
    let dir = config.network_dir();
    Store::open(&dir, config.network.params().net, config.store.clone()).with_context(|| {
        format!(
            "opening block store at {} (run `xzcdb init` to create one)",
            dir.display()
        )
    })
}

/// Create missing indexes and reconcile them with the stored chain.
fn init_indexes(store: &Store, manager: &IndexManager) -> anyhow::Result<(StoreChain, InitReport)> {
    let chain = StoreChain::load(store)?;
    let report = manager
        .init(store, &chain, &AtomicBool::new(false))
        .map_err(|e| match e {
            e if e.needs_reindex() => {
                anyhow::Error::new(e).context("index is out of step with the chain; run `xzcdb reindex`")
            }
            e => e.into(),
        })?;
    Ok((chain, report))
}

fn print_report(report: &InitReport) {
    for name in &report.created {
        println!("  {} created index {}", "+".green(), name.bold());
    }
    if report.disconnected > 0 {
        println!("  rolled back {} orphaned index blocks", report.disconnected);
    }
    if report.connected > 0 {
        println!("  indexed {} blocks", report.connected);
    }
}

fn cmd_init(config: &NodeConfig) -> anyhow::Result<()> {
    let params = config.network.params();
    let dir = config.network_dir();
    let store = match Store::create(&dir, params.net, config.store.clone()) {
        Ok(store) => {
            println!("{} Created {} block store in {}", "✓".green().bold(), params.name, dir.display().to_string().bold());
            store
        }
        Err(DbError::DbExists(_)) => {
            println!("Block store already exists in {}", dir.display().to_string().bold());
            open_store(config)?
        }
        Err(e) => return Err(e.into()),
    };
    let manager = IndexManager::from_config(&config.index)?;
    let (_, report) = init_indexes(&store, &manager)?;
    print_report(&report);
    Ok(())
}

fn cmd_info(config: &NodeConfig, format: OutputFormat) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let best = store.best_state()?;
    let files = store.block_files().file_numbers()?;
    let bytes = store.block_files().total_size()?;
    let cursor = store.block_files().write_cursor();
    let tips = store.view(|tx| index_tips(tx))?;

    if format == OutputFormat::Json {
        let indexes: Vec<_> = tips
            .iter()
            .map(|(name, tip)| {
                json!({
                    "name": name,
                    "hash": tip.map(|t| t.hash.to_string()),
                    "height": tip.map(|t| t.height),
                })
            })
            .collect();
        let out = json!({
            "network": config.network.to_string(),
            "path": store.path().display().to_string(),
            "best": best.map(|b| json!({ "hash": b.hash.to_string(), "height": b.height })),
            "block_files": files.len(),
            "block_bytes": bytes,
            "write_cursor": cursor.to_string(),
            "indexes": indexes,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Network: {}", config.network.to_string().cyan());
    println!("Store: {}", store.path().display());
    match best {
        Some(b) => println!("Best block: {} at height {}", b.hash.to_string().yellow(), b.height.to_string().bold()),
        None => println!("Best block: {}", "none".dimmed()),
    }
    println!("Block files: {} ({} bytes, next write at {})", files.len(), bytes, cursor);
    if tips.is_empty() {
        println!("Indexes: {}", "none".dimmed());
    }
    for (name, tip) in &tips {
        match tip {
            Some(t) => println!("  {} at height {} ({})", name.bold(), t.height, t.hash.short_hex()),
            None => println!("  {} {}", name.bold(), "empty".dimmed()),
        }
    }
    Ok(())
}

/// Outcome of [`import_blocks`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: u64,
    pub skipped: u64,
    pub tip: Option<BestState>,
}

/// Append hex-encoded blocks, one per line, to the main chain.
///
/// Every block must extend the current tip, and the first must be the
/// network's genesis block. Blocks already on the main chain are skipped, so
/// an interrupted import can be rerun.
pub fn import_blocks<R: BufRead>(
    store: &Store,
    manager: &IndexManager,
    chain: &mut StoreChain,
    params: &Params,
    input: R,
) -> anyhow::Result<ImportSummary> {
    let mut summary = ImportSummary {
        tip: store.best_state()?,
        ..ImportSummary::default()
    };
    for (n, line) in input.lines().enumerate() {
        let line_no = n + 1;
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let bytes = hex::decode(line).with_context(|| format!("line {line_no}: invalid hex"))?;
        let height = summary.tip.map_or(0, |tip| tip.height + 1);
        let block = ChainBlock::from_bytes(&bytes, height)
            .with_context(|| format!("line {line_no}: malformed block"))?;
        let hash = block.hash();

        if chain.main_chain_has_block(&hash) {
            debug!(%hash, "block already on the main chain");
            summary.skipped += 1;
            continue;
        }
        let tip_hash = summary.tip.map_or(Hash::ZERO, |tip| tip.hash);
        if block.prev_hash() != tip_hash {
            bail!("line {line_no}: block {hash} does not extend the tip {tip_hash}");
        }
        params
            .verify_block(height, &hash)
            .with_context(|| format!("line {line_no}"))?;

        let state = BestState { hash, height };
        store.update(|tx| -> IndexResult<()> {
            tx.store_block(&bytes)?;
            tx.set_best_state(state);
            let spent = if manager.needs_spent_outputs() {
                fetch_spent_outputs(&*tx, &block)?
            } else {
                Vec::new()
            };
            manager.connect_block(tx, &block, &spent)
        })?;
        chain.push(hash);
        summary.tip = Some(state);
        summary.imported += 1;
    }
    info!(imported = summary.imported, skipped = summary.skipped, "import finished");
    Ok(summary)
}

fn cmd_import(config: &NodeConfig, args: ImportArgs) -> anyhow::Result<()> {
    let params = config.network.params();
    let store = Store::open_or_create(&config.network_dir(), params.net, config.store.clone())?;
    let manager = IndexManager::from_config(&config.index)?;
    let (mut chain, report) = init_indexes(&store, &manager)?;
    print_report(&report);

    let file = std::fs::File::open(&args.path)
        .with_context(|| format!("opening {}", args.path.display()))?;
    let summary = import_blocks(&store, &manager, &mut chain, params, std::io::BufReader::new(file))?;
    println!(
        "{} Imported {} blocks ({} already present)",
        "✓".green().bold(),
        summary.imported,
        summary.skipped
    );
    if let Some(tip) = summary.tip {
        println!("  Tip: {} at height {}", tip.hash.to_string().yellow(), tip.height);
    }
    Ok(())
}

fn parse_hash(s: &str) -> anyhow::Result<Hash> {
    s.parse().with_context(|| format!("not a 64-digit hex hash: {s}"))
}

fn cmd_block(config: &NodeConfig, args: BlockArgs, format: OutputFormat) -> anyhow::Result<()> {
    let hash = parse_hash(&args.hash)?;
    let store = open_store(config)?;
    let bytes = store.view(|tx| tx.fetch_block(&hash))?;
    if args.raw {
        println!("{}", hex::encode(&bytes));
        return Ok(());
    }
    let block = Block::decode(&bytes)?;
    let txids: Vec<String> = block.transactions.iter().map(|t| t.txid().to_string()).collect();

    if format == OutputFormat::Json {
        let out = json!({
            "hash": hash.to_string(),
            "size": bytes.len(),
            "version": block.header.version,
            "prev_block": block.header.prev_block.to_string(),
            "merkle_root": block.header.merkle_root.to_string(),
            "timestamp": block.header.timestamp,
            "bits": format!("{:08x}", block.header.bits),
            "nonce": block.header.nonce,
            "tx": txids,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Block {}", hash.to_string().yellow().bold());
    println!("  Size: {} bytes", bytes.len());
    println!("  Previous: {}", block.header.prev_block);
    println!("  Merkle root: {}", block.header.merkle_root);
    println!("  Time: {}  Bits: {:08x}  Nonce: {}", block.header.timestamp, block.header.bits, block.header.nonce);
    println!("  Transactions: {}", txids.len());
    for txid in &txids {
        println!("    {txid}");
    }
    Ok(())
}

fn require_index<T>(result: IndexResult<T>, name: &str) -> anyhow::Result<T> {
    match result {
        Err(IndexError::NotInitialized(_)) => {
            bail!("the {name} index is not built; enable it and run `xzcdb reindex`")
        }
        other => Ok(other?),
    }
}

fn cmd_tx(config: &NodeConfig, args: TxArgs, format: OutputFormat) -> anyhow::Result<()> {
    let txid = parse_hash(&args.txid)?;
    let store = open_store(config)?;
    let found = require_index(
        store.view(|tx| -> IndexResult<_> {
            match TxIndex::tx_region(tx, &txid)? {
                Some(region) => Ok(Some((region, TxIndex::fetch_transaction(tx, &txid)?))),
                None => Ok(None),
            }
        }),
        TX_INDEX_NAME,
    )?;
    let Some((region, Some(transaction))) = found else {
        bail!("transaction {txid} is not on the main chain");
    };

    if format == OutputFormat::Json {
        let out = json!({
            "txid": txid.to_string(),
            "block": region.hash.to_string(),
            "offset": region.offset,
            "size": region.len,
            "version": transaction.version,
            "lock_time": transaction.lock_time,
            "inputs": transaction.inputs.iter().map(|i| json!({
                "prev_txid": i.previous_output.hash.to_string(),
                "prev_index": i.previous_output.index,
            })).collect::<Vec<_>>(),
            "outputs": transaction.outputs.iter().map(|o| json!({
                "value": o.value,
                "script": hex::encode(&o.pk_script),
            })).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Transaction {}", txid.to_string().yellow().bold());
    println!("  Block: {} (offset {}, {} bytes)", region.hash, region.offset, region.len);
    for input in &transaction.inputs {
        if transaction.is_coinbase() {
            println!("  in  {}", "coinbase".cyan());
        } else {
            println!("  in  {}:{}", input.previous_output.hash, input.previous_output.index);
        }
    }
    for (i, output) in transaction.outputs.iter().enumerate() {
        let addrs: Vec<String> = extract_address_keys(&output.pk_script)
            .iter()
            .map(ToString::to_string)
            .collect();
        println!("  out {i}: {} {}", output.value, addrs.join(", ").dimmed());
    }
    Ok(())
}

/// Address keys named by `input`: a hex output script, or a base58 address
/// of `params`' network.
pub fn address_keys(params: &Params, input: &str) -> anyhow::Result<Vec<AddressKey>> {
    if input.len() % 2 == 0 && input.bytes().all(|b| b.is_ascii_hexdigit()) {
        let script = hex::decode(input).context("script is not valid hex")?;
        let keys = extract_address_keys(&script);
        if keys.is_empty() {
            bail!("script does not pay a recognised address type");
        }
        return Ok(keys);
    }

    let registry = NetworkRegistry::with_defaults();
    if let Some(sep) = input.rfind('1') {
        if registry.is_bech32_segwit_prefix(&input[..=sep]) {
            bail!("bech32 addresses are not accepted; pass the output script in hex");
        }
    }
    let key = registry
        .decode_address(params, input)
        .with_context(|| format!("cannot use {input} on {}", params.name))?;
    Ok(vec![key])
}

fn cmd_addr(config: &NodeConfig, args: AddrArgs) -> anyhow::Result<()> {
    let params = config.network.params();
    let keys = address_keys(params, &args.address)?;
    let store = open_store(config)?;
    for key in keys {
        let (count, regions) = require_index(
            store.view(|tx| -> IndexResult<_> {
                Ok((
                    AddrIndex::tx_count(tx, &key)?,
                    AddrIndex::regions_for_address(tx, &key, args.skip, args.limit, args.reverse)?,
                ))
            }),
            xzc_index::ADDR_INDEX_NAME,
        )?;
        let label = match params.encode_address(&key) {
            Some(address) => format!("{address} [{key}]"),
            None => key.to_string(),
        };
        println!("{} ({} transactions)", label.yellow().bold(), count);
        for region in regions {
            println!("  block {} offset {} ({} bytes)", region.hash.short_hex(), region.offset, region.len);
        }
    }
    Ok(())
}

fn cmd_reindex(config: &NodeConfig) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let manager = IndexManager::from_config(&config.index)?;
    if manager.is_empty() {
        bail!("no indexes are enabled; pass --txindex or --addrindex");
    }
    for name in manager.names() {
        match manager.drop_index(&store, name) {
            Ok(dropped) => {
                for name in dropped {
                    println!("  {} dropped {}", "-".red(), name.bold());
                }
            }
            Err(IndexError::UnknownIndexer(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }
    let (_, report) = init_indexes(&store, &manager)?;
    print_report(&report);
    println!("{} Reindex complete", "✓".green().bold());
    Ok(())
}

fn cmd_drop_index(config: &NodeConfig, args: DropIndexArgs) -> anyhow::Result<()> {
    let store = open_store(config)?;
    // Every known index is registered so dependants are found even when
    // they are disabled.
    let manager = IndexManager::from_config(&IndexConfig {
        tx_index: true,
        addr_index: true,
        ..config.index.clone()
    })?;
    for name in manager.drop_index(&store, &args.name)? {
        println!("{} Dropped index {}", "✓".green(), name.bold());
    }
    Ok(())
}

fn cmd_verify(config: &NodeConfig) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let report = store.check_integrity()?;
    if report.is_ok() {
        println!(
            "{} {} blocks verified ({} bytes)",
            "✓".green().bold(),
            report.blocks_checked,
            report.bytes_checked
        );
        return Ok(());
    }
    for (hash, reason) in &report.corrupt {
        println!("{} {}: {}", "✗".red().bold(), hash, reason);
    }
    bail!(
        "{} of {} blocks are corrupt",
        report.corrupt.len(),
        report.blocks_checked
    )
}
