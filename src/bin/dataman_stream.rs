//! Dataman Stream Binary (producer)
//!
//! Membuat (atau attach ke) segment lalu mengisinya dengan sinyal sinus
//! multichannel. Baris pertama stdout adalah handle segment, untuk
//! diserahkan ke consumer.
//!
//! Usage:
//!   cargo run --release --bin dataman_stream -- [OPTIONS]

use std::io::Write;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::{info, warn};

use dataman::config::DEFAULT_CONTROL_ADDR;
use dataman::core::{RingBuffer, Sample, SampleType, Segment, SegmentHandle};
use dataman::network::ControlServer;
use dataman::stream::{NoCommands, StreamWriter, Streamer, StreamerConfig, SyntheticSource};

/// Producer configuration
struct StreamConfig {
    channels: usize,
    capacity: usize,
    sample_type: SampleType,
    attach: Option<String>,
    control: Option<String>,
    block_width: usize,
    lookahead: Option<usize>,
    sample_rate: f64,
    length: Option<u64>,
    hold: bool,
    verbose: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            capacity: 48_000 * 10,
            sample_type: SampleType::Float32,
            attach: None,
            control: None,
            block_width: 1024,
            lookahead: None,
            sample_rate: 48_000.0,
            length: None,
            hold: false,
            verbose: false,
        }
    }
}

fn print_help() {
    println!("Dataman Stream - Shared Sample Buffer Producer\n");
    println!("Usage: dataman_stream [OPTIONS]\n");
    println!("Options:");
    println!("  -c, --channels <N>     Channel count (default: 2)");
    println!("  -n, --capacity <N>     Columns per channel (default: 480000)");
    println!("  -t, --type <NAME>      Sample type: float32|int16|float64|int32|uint16");
    println!("  -a, --attach <PATH>    Fill an existing segment instead of creating one");
    println!("      --control [ADDR]   Accept Stop/Seek/Position (default: {DEFAULT_CONTROL_ADDR})");
    println!("      --block <N>        Columns per append (default: 1024)");
    println!("      --lookahead <N>    Max columns ahead of the consumer position");
    println!("      --rate <HZ>        Synthetic sample rate (default: 48000)");
    println!("      --length <N>       Source length in columns (default: unbounded)");
    println!("      --hold             Keep the segment until all consumers detach");
    println!("  -v, --verbose          Debug logging");
    println!("  -h, --help             Show this help");
}

fn parse_value<T: std::str::FromStr>(args: &[String], i: usize, flag: &str) -> anyhow::Result<T> {
    let raw = args
        .get(i + 1)
        .with_context(|| format!("{flag} needs a value"))?;
    raw.parse()
        .map_err(|_| anyhow::anyhow!("invalid value `{raw}` for {flag}"))
}

fn parse_args() -> anyhow::Result<StreamConfig> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = StreamConfig::default();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--channels" | "-c" => {
                config.channels = parse_value(&args, i, flag)?;
                i += 1;
            }
            "--capacity" | "-n" => {
                config.capacity = parse_value(&args, i, flag)?;
                i += 1;
            }
            "--type" | "-t" => {
                config.sample_type = parse_value(&args, i, flag)?;
                i += 1;
            }
            "--attach" | "-a" => {
                config.attach = Some(parse_value(&args, i, flag)?);
                i += 1;
            }
            "--control" => match args.get(i + 1).filter(|v| !v.starts_with('-')) {
                Some(addr) => {
                    config.control = Some(addr.clone());
                    i += 1;
                }
                None => config.control = Some(DEFAULT_CONTROL_ADDR.to_string()),
            },
            "--block" => {
                config.block_width = parse_value(&args, i, flag)?;
                i += 1;
            }
            "--lookahead" => {
                config.lookahead = Some(parse_value(&args, i, flag)?);
                i += 1;
            }
            "--rate" => {
                config.sample_rate = parse_value(&args, i, flag)?;
                i += 1;
            }
            "--length" => {
                config.length = Some(parse_value(&args, i, flag)?);
                i += 1;
            }
            "--hold" => config.hold = true,
            "--verbose" | "-v" => config.verbose = true,
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => bail!("unknown option `{other}` (see --help)"),
        }
        i += 1;
    }

    Ok(config)
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "dataman=debug" } else { "dataman=info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}

fn open_segment(config: &StreamConfig) -> anyhow::Result<Segment> {
    match &config.attach {
        Some(path) => {
            let handle: SegmentHandle = path.parse()?;
            let segment = Segment::attach(&handle)
                .with_context(|| format!("attaching to {handle}"))?;
            if segment.sample_type() != config.sample_type {
                info!(
                    segment_type = %segment.sample_type(),
                    "using the sample type declared by the segment"
                );
            }
            Ok(segment)
        }
        None => Ok(Segment::create(
            config.channels,
            config.capacity,
            config.sample_type.name(),
        )?),
    }
}

fn stream<T: Sample>(segment: Segment, config: &StreamConfig) -> anyhow::Result<()> {
    let buffer = RingBuffer::<T>::from_segment(segment)?;
    let writer = StreamWriter::new(buffer)?;

    let mut source = SyntheticSource::new(writer.buffer().channels());
    source.sample_rate = config.sample_rate;
    source.length = config.length;

    let streamer_config = StreamerConfig {
        block_width: config.block_width,
        lookahead: config.lookahead,
        ..Default::default()
    };
    let mut streamer = Streamer::new(writer, source, streamer_config)?;

    let outcome = match &config.control {
        Some(addr) => {
            let addr: SocketAddr = addr
                .parse()
                .with_context(|| format!("invalid control address `{addr}`"))?;
            let mut server = ControlServer::bind(addr)
                .with_context(|| format!("binding control server on {addr}"))?;
            info!(addr = %server.local_addr()?, "control plane listening");
            streamer.run(&mut server)?
        }
        None => streamer.run(&mut NoCommands)?,
    };

    let writer = streamer.into_writer();
    info!(?outcome, columns = writer.cursor(), "stream finished");
    let buffer = writer.into_inner();

    if config.hold {
        // Segment di-unlink oleh proses terakhir yang detach. Consumer yang
        // mati tanpa detach di-reap di dalam wait_for_detach.
        info!(attached = buffer.segment().attached_count(), "holding segment");
        buffer.segment().wait_for_detach(Duration::from_millis(100));
    }
    Ok(())
}

fn run(config: StreamConfig) -> anyhow::Result<()> {
    if config.lookahead.is_some() && config.control.is_none() {
        warn!("--lookahead without --control never sees consumer positions");
    }

    let segment = open_segment(&config)?;
    info!(
        handle = %segment.handle(),
        channels = segment.channels(),
        capacity = segment.capacity(),
        sample_type = %segment.sample_type(),
        "segment ready"
    );

    // Handle harus sampai ke consumer sebelum data mulai mengalir
    let mut stdout = std::io::stdout();
    writeln!(stdout, "{}", segment.handle())?;
    stdout.flush()?;

    match segment.sample_type() {
        SampleType::Float32 => stream::<f32>(segment, &config),
        SampleType::Int16 => stream::<i16>(segment, &config),
        SampleType::Float64 => stream::<f64>(segment, &config),
        SampleType::Int32 => stream::<i32>(segment, &config),
        SampleType::UInt16 => stream::<u16>(segment, &config),
    }
}

fn main() {
    let config = match parse_args() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("dataman_stream: {e}");
            std::process::exit(2);
        }
    };
    init_tracing(config.verbose);

    if let Err(e) = run(config) {
        eprintln!("dataman_stream: {e:#}");
        std::process::exit(1);
    }
}
