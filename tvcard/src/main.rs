//! tvcard: build Genpix DiSEqC commands and MD-API decode requests.
//!
//! Commands are written to a logging transport that prints every record it
//! is given, so the tool can be used without hardware.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use log::{debug, info, warn};

use tvcard::ca::{
    resolve_program, MemoryPreferenceStore, PreferenceStore, ResolvedProgram,
    TomlPreferenceStore, PREFERENCES_FILE,
};
use tvcard::config::ConfigFile;
use tvcard::device::{
    CommandTransport, ConditionalAccessProvider, CustomTuner, DecodeFilter, DeviceError,
    DiseqcController, GenpixDevice, MdPluginDevice, PropertySupport, INSTANCE_SIZE,
};
use tvcard::dump::{hex_dump, parse_hex};
use tvcard::logging;
use tvcard::ts_analyzer::{CatTable, PmtTable, PsiSection};
use tvcard_protocol::{
    encode_pid_list_record, encode_program_record, CaPmtCommand, CaPmtListManagementAction,
    ChannelDescriptor, DeviceStatus, Modulation, Polarisation, ServiceChannel, Tone22k, ToneBurst,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (default: ./tvcard.toml if present)
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Directory where log files are stored
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Number of days to keep log files
    #[arg(long)]
    log_retention_days: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a tuning command
    Tune {
        /// Transponder frequency in kHz
        #[arg(long)]
        frequency: u32,
        /// Symbol rate in ks/s
        #[arg(long)]
        symbol_rate: u32,
        #[arg(long, value_enum, default_value = "h")]
        polarisation: PolarisationArg,
        /// BDA modulation type value
        #[arg(long, default_value = "-1", allow_hyphen_values = true)]
        modulation: i32,
        /// LNB low band LOF in kHz
        #[arg(long, default_value = "9750000")]
        lnb_low: u32,
        /// LNB high band LOF in kHz
        #[arg(long, default_value = "10600000")]
        lnb_high: u32,
        /// LNB switch frequency in kHz (0 = single band)
        #[arg(long, default_value = "11700000")]
        lnb_switch: u32,
    },
    /// Build a raw DiSEqC command
    Diseqc {
        /// Command bytes in hex, e.g. "E0 10 38 F0"
        command: String,
    },
    /// Build a tone or data burst command
    Burst {
        #[arg(value_enum)]
        burst: BurstArg,
    },
    /// Resolve the decode request of a service from captured PMT/CAT sections
    Decode {
        /// PMT section (binary, or hex text)
        #[arg(long)]
        pmt: PathBuf,
        /// CAT section (binary, or hex text)
        #[arg(long)]
        cat: Option<PathBuf>,
        #[arg(long)]
        tsid: u16,
        #[arg(long)]
        pmt_pid: u16,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        provider: Option<String>,
        /// The service is a radio service
        #[arg(long)]
        radio: bool,
        /// Also send the request through the MD plugin for this tuner
        #[arg(long)]
        device_path: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PolarisationArg {
    H,
    V,
    L,
    R,
}

impl From<PolarisationArg> for Polarisation {
    fn from(arg: PolarisationArg) -> Self {
        match arg {
            PolarisationArg::H => Polarisation::LinearH,
            PolarisationArg::V => Polarisation::LinearV,
            PolarisationArg::L => Polarisation::CircularL,
            PolarisationArg::R => Polarisation::CircularR,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BurstArg {
    None,
    Tone,
    Data,
}

impl From<BurstArg> for ToneBurst {
    fn from(arg: BurstArg) -> Self {
        match arg {
            BurstArg::None => ToneBurst::None,
            BurstArg::Tone => ToneBurst::ToneBurst,
            BurstArg::Data => ToneBurst::DataBurst,
        }
    }
}

/// Accepts every property and prints what it is sent.
struct LoggingTransport;

impl CommandTransport for LoggingTransport {
    fn query_supported(&self, _property: u32) -> Result<PropertySupport, DeviceStatus> {
        Ok(PropertySupport {
            get: false,
            set: true,
        })
    }

    fn set_property(&self, property: u32, _instance: &[u8; INSTANCE_SIZE], data: &[u8]) -> DeviceStatus {
        println!("property {} ({} bytes)\n{}", property, data.len(), hex_dump(data));
        DeviceStatus::OK
    }
}

/// Decode filter printing the records it is handed.
struct LoggingFilter {
    directory: parking_lot::Mutex<String>,
}

impl DecodeFilter for LoggingFilter {
    fn set_plugins_directory(&self, directory: &str) -> Result<(), DeviceError> {
        *self.directory.lock() = directory.to_string();
        Ok(())
    }

    fn supports_extended(&self) -> bool {
        true
    }

    fn change_channel(&self, program: &[u8]) -> Result<(), DeviceError> {
        println!("[{}] program record\n{}", self.directory.lock(), hex_dump(program));
        Ok(())
    }

    fn change_channel_ex(&self, program: &[u8], pids: &[u8]) -> Result<(), DeviceError> {
        self.change_channel(program)?;
        println!("[{}] PID list record\n{}", self.directory.lock(), hex_dump(pids));
        Ok(())
    }
}

fn read_section(path: &Path) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let raw = fs::read(path)?;
    match std::str::from_utf8(&raw).map(parse_hex) {
        Ok(Ok(bytes)) => Ok(bytes),
        _ => Ok(raw),
    }
}

fn parse_pmt(data: &[u8]) -> Result<PmtTable, Box<dyn std::error::Error>> {
    let section = PsiSection::parse(data)?;
    if !section.verify_crc(data) {
        warn!("PMT CRC mismatch, parsing anyway");
    }
    Ok(PmtTable::parse(&section)?)
}

fn parse_cat(data: &[u8]) -> Result<CatTable, Box<dyn std::error::Error>> {
    let section = PsiSection::parse(data)?;
    if !section.verify_crc(data) {
        warn!("CAT CRC mismatch, parsing anyway");
    }
    Ok(CatTable::parse(&section)?)
}

fn print_resolved(resolved: &ResolvedProgram) -> Result<(), Box<dyn std::error::Error>> {
    if resolved.streams.truncated || resolved.ca_systems.truncated {
        warn!("Some PIDs did not fit into the decode request");
    }
    println!("{}", serde_json::to_string_pretty(&resolved.request)?);
    println!("program record\n{}", hex_dump(&encode_program_record(&resolved.request)));
    println!("PID list record\n{}", hex_dump(&encode_pid_list_record(&resolved.request.pids)));
    Ok(())
}

/// Send an already printed program through the MD plugin of `device_path`.
fn send_through_plugin<S: PreferenceStore>(
    config_dir: &Path,
    device_path: &str,
    store: S,
    channel: &ServiceChannel,
    resolved: &ResolvedProgram,
) -> Result<(), Box<dyn std::error::Error>> {
    let device = MdPluginDevice::initialise(config_dir, device_path, "tvcard", store, |_| {
        LoggingFilter {
            directory: parking_lot::Mutex::new(String::new()),
        }
    })?;
    device.open_interface()?;
    device.send_resolved(
        channel,
        CaPmtListManagementAction::Only,
        CaPmtCommand::OkDescrambling,
        resolved,
    )?;
    device.close_interface()?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Config file: explicit path > auto-detect > default
    let (file_config, config_path) = ConfigFile::discover(args.config.as_deref())?;

    // Command line takes precedence
    let log_dir = args
        .log_dir
        .clone()
        .or_else(|| file_config.logging.log_dir.clone())
        .unwrap_or_else(|| PathBuf::from("logs"));
    let retention_days = args
        .log_retention_days
        .or(file_config.logging.retention_days)
        .unwrap_or(7);
    let level = if args.verbose {
        "debug"
    } else {
        file_config.logging.level.as_deref().unwrap_or("info")
    };
    let _guard = logging::init_logging(&log_dir, retention_days, level)?;

    if let Some(path) = &config_path {
        info!("Loaded config from: {}", path.display());
    }
    let diseqc_repeats = file_config.tuning.diseqc_repeats.unwrap_or(0);

    match args.command {
        Command::Tune {
            frequency,
            symbol_rate,
            polarisation,
            modulation,
            lnb_low,
            lnb_high,
            lnb_switch,
        } => {
            let channel = ChannelDescriptor {
                modulation: Modulation::try_from(modulation)?,
                lnb_low_lof_khz: lnb_low,
                lnb_high_lof_khz: lnb_high,
                lnb_switch_khz: lnb_switch,
                ..ChannelDescriptor::universal(frequency, symbol_rate, polarisation.into())
            };
            debug!("Tuning to {:?}", channel);
            let device = GenpixDevice::initialise(LoggingTransport)?.with_diseqc_repeats(diseqc_repeats);
            device.tune(&channel)?;
        }
        Command::Diseqc { command } => {
            let bytes = parse_hex(&command)?;
            let device = GenpixDevice::initialise(LoggingTransport)?.with_diseqc_repeats(diseqc_repeats);
            device.send_diseqc_command(&bytes)?;
        }
        Command::Burst { burst } => {
            let device = GenpixDevice::initialise(LoggingTransport)?;
            device.set_tone_state(burst.into(), Tone22k::Off)?;
        }
        Command::Decode {
            pmt,
            cat,
            tsid,
            pmt_pid,
            name,
            provider,
            radio,
            device_path,
        } => {
            let pmt = parse_pmt(&read_section(&pmt)?)?;
            let cat = match cat {
                Some(path) => parse_cat(&read_section(&path)?)?,
                None => CatTable::default(),
            };
            let channel = ServiceChannel {
                name,
                provider,
                transport_stream_id: tsid,
                service_id: pmt.program_number,
                pmt_pid,
                is_tv: !radio,
            };

            let config_dir = file_config.mdapi.config_dir.as_deref();
            match (config_dir, device_path) {
                (Some(dir), device_path) => {
                    // Resolved once: a second pass would see its own fill-out stubs.
                    let store = TomlPreferenceStore::new(dir.join(PREFERENCES_FILE));
                    let resolved = resolve_program(&channel, &pmt, &cat, &store);
                    print_resolved(&resolved)?;
                    if let Some(device_path) = device_path {
                        send_through_plugin(dir, &device_path, store, &channel, &resolved)?;
                    }
                }
                (None, device_path) => {
                    if device_path.is_some() {
                        warn!("No [mdapi] config_dir configured, not sending to the plugin");
                    }
                    let store = MemoryPreferenceStore::default();
                    print_resolved(&resolve_program(&channel, &pmt, &cat, &store))?;
                }
            }
        }
    }

    Ok(())
}
