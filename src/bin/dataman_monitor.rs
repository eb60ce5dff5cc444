//! Dataman Monitor Binary (consumer)
//!
//! Attach ke segment lewat handle, ikuti cursor producer, dan hitung
//! statistik per channel. Opsional mengirim perintah ke producer lewat
//! control plane.
//!
//! Usage:
//!   cargo run --release --bin dataman_monitor -- <HANDLE> [OPTIONS]

use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use tracing::{info, warn};

use dataman::config::DEFAULT_CONTROL_ADDR;
use dataman::core::{RingBuffer, Sample, SampleType, Segment, SegmentHandle, Window};
use dataman::network::ControlClient;
use dataman::stream::{SampleSink, StreamReader};

/// Monitor configuration
struct MonitorConfig {
    handle: Option<String>,
    control: Option<String>,
    window: usize,
    seek: Option<u64>,
    stop_after: Option<usize>,
    report: bool,
    duration: Option<Duration>,
    verbose: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            handle: None,
            control: None,
            window: 4096,
            seek: None,
            stop_after: None,
            report: false,
            duration: None,
            verbose: false,
        }
    }
}

/// Running statistics per channel
#[derive(Debug, Clone, Default)]
struct ChannelStats {
    count: u64,
    min: f64,
    max: f64,
    sum: f64,
    sum_sq: f64,
}

impl ChannelStats {
    fn push(&mut self, v: f64) {
        if self.count == 0 {
            self.min = v;
            self.max = v;
        } else {
            self.min = self.min.min(v);
            self.max = self.max.max(v);
        }
        self.count += 1;
        self.sum += v;
        self.sum_sq += v * v;
    }

    fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    fn rms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.sum_sq / self.count as f64).sqrt()
        }
    }
}

struct StatsSink {
    channels: Vec<ChannelStats>,
    windows: u64,
}

impl StatsSink {
    fn new(channels: usize) -> Self {
        Self {
            channels: vec![ChannelStats::default(); channels],
            windows: 0,
        }
    }

    fn print_stats(&self, position: usize, cursor: usize, uptime: Duration) {
        let rate = position as f64 / uptime.as_secs_f64().max(f64::EPSILON);
        println!(
            "\n📊 Monitor (uptime: {:.1}s) position {} / cursor {} ({:.0} col/s, {} windows)",
            uptime.as_secs_f64(),
            position,
            cursor,
            rate,
            self.windows
        );
        for (ch, stats) in self.channels.iter().enumerate() {
            println!(
                "   ch{:<3} min {:>10.4}  max {:>10.4}  mean {:>10.4}  rms {:>10.4}",
                ch,
                stats.min,
                stats.max,
                stats.mean(),
                stats.rms()
            );
        }
    }
}

impl<T: Sample> SampleSink<T> for StatsSink {
    fn consume(&mut self, window: &Window<'_, T>) -> dataman::Result<()> {
        for (stats, row) in self.channels.iter_mut().zip(window.rows()) {
            for &v in row {
                stats.push(v.to_f64());
            }
        }
        self.windows += 1;
        Ok(())
    }
}

fn print_help() {
    println!("Dataman Monitor - Shared Sample Buffer Consumer\n");
    println!("Usage: dataman_monitor <HANDLE> [OPTIONS]\n");
    println!("Options:");
    println!("      --control [ADDR]   Connect to the producer (default: {DEFAULT_CONTROL_ADDR})");
    println!("  -w, --window <N>       Max columns per window (default: 4096)");
    println!("      --seek <N>         Ask the producer to continue from source position N");
    println!("      --stop-after <N>   Ask the producer to stop after N columns");
    println!("      --report           Report read position (look-ahead throttling)");
    println!("  -d, --duration <SECS>  Exit after SECS seconds");
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

fn parse_args() -> anyhow::Result<MonitorConfig> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = MonitorConfig::default();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--control" => match args.get(i + 1).filter(|v| !v.starts_with('-')) {
                Some(addr) => {
                    config.control = Some(addr.clone());
                    i += 1;
                }
                None => config.control = Some(DEFAULT_CONTROL_ADDR.to_string()),
            },
            "--window" | "-w" => {
                config.window = parse_value(&args, i, flag)?;
                i += 1;
            }
            "--seek" => {
                config.seek = Some(parse_value(&args, i, flag)?);
                i += 1;
            }
            "--stop-after" => {
                config.stop_after = Some(parse_value(&args, i, flag)?);
                i += 1;
            }
            "--report" => config.report = true,
            "--duration" | "-d" => {
                let secs: f64 = parse_value(&args, i, flag)?;
                config.duration = Some(Duration::from_secs_f64(secs.max(0.0)));
                i += 1;
            }
            "--verbose" | "-v" => config.verbose = true,
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other if other.starts_with('-') => bail!("unknown option `{other}` (see --help)"),
            handle => config.handle = Some(handle.to_string()),
        }
        i += 1;
    }

    if config.window == 0 {
        bail!("--window must be non-zero");
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

fn monitor<T: Sample>(
    segment: Segment,
    config: &MonitorConfig,
    mut client: Option<ControlClient>,
) -> anyhow::Result<()> {
    let mut reader = StreamReader::new(RingBuffer::<T>::from_segment(segment)?);
    let mut sink = StatsSink::new(reader.buffer().channels());

    let started = Instant::now();
    let mut last_print = started;
    let mut stop_sent = false;

    loop {
        let drained = reader.drain_into(&mut sink, config.window)?;

        if let Some(client) = client.as_mut() {
            if config.report && drained > 0 {
                client.report_position(reader.position() as u64)?;
            }
            if let Some(limit) = config.stop_after {
                if !stop_sent && reader.position() >= limit {
                    info!(position = reader.position(), "requesting producer stop");
                    client.stop()?;
                    stop_sent = true;
                }
            }
        }

        if reader.is_finished() {
            info!(columns = reader.position(), "producer stopped, all columns read");
            break;
        }
        if reader.writer_lost() {
            warn!(position = reader.position(), "producer died without stopping");
            break;
        }
        if config.duration.is_some_and(|d| started.elapsed() >= d) {
            break;
        }

        if last_print.elapsed() >= Duration::from_secs(1) {
            sink.print_stats(reader.position(), reader.cursor(), started.elapsed());
            last_print = Instant::now();
        }
        if drained == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    sink.print_stats(reader.position(), reader.cursor(), started.elapsed());
    Ok(())
}

fn run(config: MonitorConfig) -> anyhow::Result<()> {
    let Some(raw) = config.handle.as_deref() else {
        bail!("missing segment handle (see --help)");
    };
    let handle: SegmentHandle = raw.parse()?;
    let segment = Segment::attach(&handle).with_context(|| format!("attaching to {handle}"))?;
    info!(
        handle = %handle,
        channels = segment.channels(),
        capacity = segment.capacity(),
        sample_type = %segment.sample_type(),
        state = ?segment.state(),
        "attached"
    );

    let client = match &config.control {
        Some(addr) => {
            let mut client = ControlClient::connect(addr.as_str())
                .with_context(|| format!("connecting to control plane at {addr}"))?;
            // Producer yang sudah selesai tidak lagi poll control plane
            match client.heartbeat(Duration::from_secs(2)) {
                Ok(rtt) => {
                    info!(addr = %addr, rtt_us = rtt.as_micros() as u64, "control plane connected")
                }
                Err(e) => warn!(addr = %addr, error = %e, "producer did not answer heartbeat"),
            }
            if let Some(position) = config.seek {
                client.seek(position)?;
            }
            Some(client)
        }
        None => {
            if config.seek.is_some() || config.stop_after.is_some() || config.report {
                warn!("control options ignored without --control");
            }
            None
        }
    };

    match segment.sample_type() {
        SampleType::Float32 => monitor::<f32>(segment, &config, client),
        SampleType::Int16 => monitor::<i16>(segment, &config, client),
        SampleType::Float64 => monitor::<f64>(segment, &config, client),
        SampleType::Int32 => monitor::<i32>(segment, &config, client),
        SampleType::UInt16 => monitor::<u16>(segment, &config, client),
    }
}

fn main() {
    let config = match parse_args() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("dataman_monitor: {e}");
            std::process::exit(2);
        }
    };
    init_tracing(config.verbose);

    if let Err(e) = run(config) {
        eprintln!("dataman_monitor: {e:#}");
        std::process::exit(1);
    }
}
