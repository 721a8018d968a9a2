use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use rsct::io_utils::{codec_cli_error, simple_cli_error, CliError};
use rsct::{
    last_end_flag_pos, last_start_flag_pos, last_unpack_stats, pack_container_ex, set_progress_cb,
    unpack_container_ex, unwrap_file_bits, wrap_file_bits, wrap_file_bits_ratio, PackOptions,
    PadMode, RunStatus,
};

/// Protect files against loss and corruption on lossy offline channels.
#[derive(Parser)]
#[command(name = "rsct", version, about)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum PadArg {
    #[default]
    Raw,
    Zero,
    Temporal,
}

impl From<PadArg> for PadMode {
    fn from(p: PadArg) -> Self {
        match p {
            PadArg::Raw => PadMode::Raw,
            PadArg::Zero => PadMode::Zero,
            PadArg::Temporal => PadMode::Temporal,
        }
    }
}

#[derive(Subcommand)]
enum Cmd {
    /// Encode a file into a resilient container.
    Pack {
        input: PathBuf,
        output: PathBuf,
        /// Parity shards per frame (1-63).
        #[arg(long, default_value_t = 16)]
        parity: usize,
        /// Frames per interleave group.
        #[arg(long, default_value_t = 16)]
        il_depth: u16,
        /// Slice size in bytes.
        #[arg(long, default_value_t = 512)]
        slice_bytes: u16,
        /// Report slice progress on stderr.
        #[arg(long)]
        status: bool,
    },
    /// Decode a container back into the original file.
    Unpack {
        input: PathBuf,
        output: PathBuf,
        /// Policy for columns the decoder gives up on.
        #[arg(long, value_enum, default_value_t)]
        pad: PadArg,
        /// Residual-BER coefficient in [0, 1].
        #[arg(long)]
        residual_coeff: Option<f64>,
        /// Print decode statistics as JSON on stdout.
        #[arg(long)]
        json: bool,
        /// Report slice progress on stderr.
        #[arg(long)]
        status: bool,
    },
    /// Frame a file's bits between sentinel flags with dummy padding.
    Wrap {
        input: PathBuf,
        output: PathBuf,
        /// Start flag as a '0'/'1' string (may be empty).
        #[arg(long, default_value = "")]
        start: String,
        /// End flag as a '0'/'1' string (may be empty).
        #[arg(long, default_value = "")]
        end: String,
        /// Dummy bits before the start flag.
        #[arg(long, default_value_t = 0)]
        left: u64,
        /// Dummy bits after the end flag.
        #[arg(long, default_value_t = 0)]
        right: u64,
        /// Derive both dummy counts from the payload size instead.
        #[arg(long, conflicts_with_all = ["left", "right"])]
        ratio: Option<f64>,
        /// RNG seed; 0 draws from OS entropy.
        #[arg(long, default_value_t = 0)]
        seed: u32,
    },
    /// Extract the payload between sentinel flags.
    Unwrap {
        input: PathBuf,
        output: PathBuf,
        /// Start flag as a '0'/'1' string.
        #[arg(long)]
        start: String,
        /// End flag as a '0'/'1' string.
        #[arg(long)]
        end: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode, CliError> {
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Pack {
            input,
            output,
            parity,
            il_depth,
            slice_bytes,
            status,
        } => {
            if status {
                install_progress();
            }
            let opts = PackOptions {
                r: parity,
                il_depth,
                slice_bytes,
            };
            let st = pack_container_ex(&input, &output, opts)
                .map_err(|e| codec_cli_error("pack failed", e.code(), e))?;
            finish_status(status, st)
        }
        Cmd::Unpack {
            input,
            output,
            pad,
            residual_coeff,
            json,
            status,
        } => {
            if let Some(c) = residual_coeff {
                rsct::set_residual_coeff(c);
            }
            if status {
                install_progress();
            }
            let st = unpack_container_ex(&input, &output, pad.into())
                .map_err(|e| codec_cli_error("unpack failed", e.code(), e))?;
            if json {
                let stats = last_unpack_stats()
                    .ok_or_else(|| simple_cli_error("no statistics recorded"))?;
                let rendered = serde_json::to_string_pretty(&stats)
                    .map_err(|e| simple_cli_error(&format!("stats serialization: {e}")))?;
                println!("{rendered}");
            } else {
                report_stats();
            }
            finish_status(status, st)
        }
        Cmd::Wrap {
            input,
            output,
            start,
            end,
            left,
            right,
            ratio,
            seed,
        } => {
            let res = match ratio {
                Some(divisor) => wrap_file_bits_ratio(&input, &output, &start, &end, divisor, seed),
                None => wrap_file_bits(&input, &output, &start, &end, left, right, seed),
            };
            res.map_err(|e| codec_cli_error("wrap failed", e.code(), e))?;
            Ok(ExitCode::SUCCESS)
        }
        Cmd::Unwrap {
            input,
            output,
            start,
            end,
        } => {
            unwrap_file_bits(&input, &output, &start, &end)
                .map_err(|e| codec_cli_error("unwrap failed", e.code(), e))?;
            eprintln!(
                "flags found: start at bit {}, end at bit {}",
                last_start_flag_pos(),
                last_end_flag_pos()
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn install_progress() {
    set_progress_cb(Some(Box::new(|done, total| {
        eprint!("\rslices {done}/{total}");
        if done == total {
            eprintln!();
        }
    })));
}

fn report_stats() {
    if let Some(s) = last_unpack_stats() {
        eprintln!(
            "frames {}, slices ok {} / bad {}, corrected symbols {}, failed columns {}, ber est {:.3e}",
            s.frames_total, s.slices_ok, s.slices_bad, s.corrected_symbols, s.rs_fail_columns,
            s.ber_est
        );
    }
}

fn finish_status(status: bool, st: RunStatus) -> Result<ExitCode, CliError> {
    if status {
        eprintln!();
    }
    match st {
        RunStatus::Completed => Ok(ExitCode::SUCCESS),
        RunStatus::Canceled => {
            eprintln!("canceled; output is partial");
            Ok(ExitCode::FAILURE)
        }
    }
}
