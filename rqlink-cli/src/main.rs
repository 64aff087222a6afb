#![forbid(unsafe_code)]

//! `rqlink`: OTI tooling and loss simulation for the RaptorQ binding.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rqlink_core::{logging, CodecConfig};
use rqlink_fec::oti::{BlockLayout, CommonOti, SchemeSpecificOti, TransmissionInfo};
use rqlink_fec::{new_decoder, new_encoder, EncoderParams};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Parser)]
#[command(name = "rqlink", version, about = "RaptorQ OTI tooling and loss simulation")]
struct Cli {
	/// Codec configuration file (TOML). RQLINK_* variables override it.
	#[arg(long)]
	config: Option<PathBuf>,
	/// Log level (trace|debug|info|warn|error); RUST_LOG wins
	#[arg(long)]
	log_level: Option<String>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Pack or unpack OTI words
	Oti {
		#[command(subcommand)]
		action: OtiAction,
	},
	/// Show the OTI and block layout an encoder would choose for FILE
	Inspect {
		file: PathBuf,
		#[arg(long)]
		symbol_size: Option<u16>,
	},
	/// Encode FILE, drop symbols at random, decode and verify
	Simulate {
		file: PathBuf,
		/// Probability that a symbol is lost
		#[arg(long, default_value_t = 0.1)]
		loss: f64,
		/// Symbols sent per block, as a fraction beyond K
		#[arg(long, default_value_t = 0.3)]
		overhead: f64,
		#[arg(long, default_value_t = 0)]
		seed: u64,
		#[arg(long, default_value_t = 30_000)]
		timeout_ms: u64,
		#[arg(long)]
		symbol_size: Option<u16>,
	},
}

#[derive(Debug, Subcommand)]
enum OtiAction {
	Pack {
		#[arg(long)]
		transfer_length: u64,
		#[arg(long)]
		symbol_size: u16,
		#[arg(long)]
		source_blocks: u8,
		#[arg(long, default_value_t = 1)]
		sub_blocks: u16,
		#[arg(long, default_value_t = 4)]
		alignment: u8,
	},
	Unpack {
		/// Common OTI word, decimal or 0x-prefixed hex
		#[arg(long)]
		common: String,
		/// Scheme-Specific OTI word, decimal or 0x-prefixed hex
		#[arg(long)]
		scheme: String,
	},
}

#[derive(Debug, Serialize)]
struct OtiReport {
	common: String,
	scheme: String,
	common_word: u64,
	scheme_word: u32,
	transfer_length: u64,
	symbol_size: u16,
	num_source_blocks: u8,
	num_sub_blocks: u16,
	symbol_alignment: u8,
	valid: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	error: Option<String>,
}

impl OtiReport {
	fn new(info: &TransmissionInfo) -> Self {
		let common = info.common_oti();
		let scheme = info.scheme_specific_oti();
		let error = info.validate().err().map(|e| e.to_string());
		Self {
			common: common.to_string(),
			scheme: scheme.to_string(),
			common_word: common.get(),
			scheme_word: scheme.get(),
			transfer_length: info.transfer_length,
			symbol_size: info.symbol_size,
			num_source_blocks: info.num_source_blocks,
			num_sub_blocks: info.num_sub_blocks,
			symbol_alignment: info.symbol_alignment,
			valid: error.is_none(),
			error,
		}
	}
}

#[derive(Debug, Serialize)]
struct BlockReport {
	sbn: u8,
	offset: u64,
	size: u32,
	source_symbols: u16,
	min_symbols: u32,
}

#[derive(Debug, Default, Serialize)]
struct SimulationReport {
	transfer_length: u64,
	num_source_blocks: u8,
	num_sub_blocks: u16,
	symbols_sent: u64,
	symbols_lost: u64,
	blocks_ready: Vec<u8>,
	verified: bool,
	elapsed_ms: u128,
}

fn parse_word(s: &str) -> anyhow::Result<u64> {
	let s = s.trim();
	let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
		Some(hex) => u64::from_str_radix(hex, 16),
		None => s.parse::<u64>(),
	};
	parsed.with_context(|| format!("invalid OTI word: {s}"))
}

fn load_config(cli: &Cli) -> anyhow::Result<CodecConfig> {
	let mut cfg = match &cli.config {
		Some(path) => {
			let mut cfg = CodecConfig::load_from_file(path)
				.with_context(|| format!("loading {}", path.display()))?;
			cfg.apply_env()?;
			cfg
		}
		None => {
			let mut cfg = CodecConfig::default();
			cfg.apply_env()?;
			cfg
		}
	};
	if let Some(level) = &cli.log_level {
		cfg.log_level = level.clone();
	}
	cfg.validate()?;
	Ok(cfg)
}

fn encoder_params(cfg: &CodecConfig, symbol_size: Option<u16>) -> EncoderParams {
	let params = EncoderParams::from(cfg);
	match symbol_size {
		Some(t) => EncoderParams { min_sub_symbol_size: params.min_sub_symbol_size.min(t), ..params.with_symbol_size(t) },
		None => params,
	}
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();
	let cfg = load_config(&cli)?;
	logging::init(&cfg.log_level);
	debug!(?cfg, "configuration loaded");

	match cli.command {
		Command::Oti { action: OtiAction::Pack { transfer_length, symbol_size, source_blocks, sub_blocks, alignment } } => {
			let info = TransmissionInfo {
				transfer_length,
				symbol_size,
				num_source_blocks: source_blocks,
				num_sub_blocks: sub_blocks,
				symbol_alignment: alignment,
			};
			print_json(&OtiReport::new(&info))
		}
		Command::Oti { action: OtiAction::Unpack { common, scheme } } => {
			let common = CommonOti::from_raw(parse_word(&common)?);
			let scheme = u32::try_from(parse_word(&scheme)?).context("scheme-specific OTI is a 32-bit word")?;
			let info = TransmissionInfo::from_oti(common, SchemeSpecificOti::from_raw(scheme));
			print_json(&OtiReport::new(&info))
		}
		Command::Inspect { file, symbol_size } => {
			let len = std::fs::metadata(&file).with_context(|| format!("reading {}", file.display()))?.len();
			let info = encoder_params(&cfg, symbol_size).transmission_info(len)?;
			let layout = BlockLayout::new(&info);
			let blocks: Vec<BlockReport> = layout
				.iter()
				.enumerate()
				.map(|(i, b)| BlockReport {
					sbn: i as u8,
					offset: b.offset,
					size: b.size,
					source_symbols: b.source_symbols,
					min_symbols: layout.min_symbols(i as u8),
				})
				.collect();
			print_json(&json!({ "oti": OtiReport::new(&info), "blocks": blocks }))
		}
		Command::Simulate { file, loss, overhead, seed, timeout_ms, symbol_size } => {
			if !(0.0..1.0).contains(&loss) {
				bail!("loss must be in [0, 1): {loss}");
			}
			if overhead < 0.0 {
				bail!("overhead must be non-negative: {overhead}");
			}
			let data = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
			let params = encoder_params(&cfg, symbol_size);
			let report = simulate(&data, &params, &cfg, loss, overhead, seed, Duration::from_millis(timeout_ms)).await?;
			print_json(&report)?;
			if !report.verified {
				bail!("transfer incomplete: {} of {} blocks ready", report.blocks_ready.len(), report.num_source_blocks);
			}
			Ok(())
		}
	}
}

async fn simulate(
	data: &[u8],
	params: &EncoderParams,
	cfg: &CodecConfig,
	loss: f64,
	overhead: f64,
	seed: u64,
	wait: Duration,
) -> anyhow::Result<SimulationReport> {
	let started = Instant::now();
	let encoder = new_encoder(data, params)?;
	let decoder = new_decoder(encoder.common_oti(), encoder.scheme_specific_oti())?;
	let mut ready = decoder.subscribe(cfg.ready_queue_capacity)?;
	let mut rng = StdRng::seed_from_u64(seed);
	let mut report = SimulationReport {
		transfer_length: encoder.transfer_length(),
		num_source_blocks: encoder.num_source_blocks(),
		num_sub_blocks: encoder.num_sub_blocks(),
		..SimulationReport::default()
	};
	info!(blocks = report.num_source_blocks, sub_blocks = report.num_sub_blocks, "simulating transfer");

	for sbn in 0..encoder.num_source_blocks() {
		let k = f64::from(encoder.num_source_symbols(sbn));
		let budget = (k * (1.0 + overhead)).ceil() as u32;
		for esi in 0..budget.min(encoder.max_symbols(sbn)) {
			report.symbols_sent += 1;
			if rng.gen_bool(loss) {
				report.symbols_lost += 1;
				continue;
			}
			decoder.decode(sbn, esi, &encoder.encode_symbol(sbn, esi)?)?;
		}
	}
	encoder.close()?;

	let deadline = tokio::time::Instant::now() + wait;
	while report.blocks_ready.len() < usize::from(report.num_source_blocks) {
		match tokio::time::timeout_at(deadline, ready.recv()).await {
			Ok(Some(sbn)) => {
				debug!(sbn, "block ready");
				report.blocks_ready.push(sbn);
			}
			Ok(None) | Err(_) => break,
		}
	}
	report.blocks_ready.sort_unstable();

	if decoder.is_source_object_ready()? {
		let mut object = vec![0u8; data.len()];
		decoder.source_object(&mut object)?;
		report.verified = object == data;
	}
	tokio::task::spawn_blocking(move || decoder.close()).await??;
	report.elapsed_ms = started.elapsed().as_millis();
	info!(verified = report.verified, elapsed_ms = report.elapsed_ms as u64, "simulation finished");
	Ok(report)
}
