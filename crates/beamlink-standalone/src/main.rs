use std::net::Ipv4Addr;
use std::panic;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use beam_core::LaserSettings;
use beam_net::DecoderAdapter;
use beamlink::{load_settings, BeamLinkSystem};
use clap::Parser;

/// Frame period of the update loop (~60 Hz).
const TICK: Duration = Duration::from_millis(16);

const STATUS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(
    name = "beamlink",
    version,
    about = "Receive multicast laser show data and run the scanner simulation headless"
)]
struct Cli {
    /// Settings file (JSON). Missing fields use defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Interface address used for group membership
    #[arg(long, default_value_t = Ipv4Addr::UNSPECIFIED)]
    bind: Ipv4Addr,

    /// UDP port, overrides the settings file
    #[arg(long)]
    port: Option<u16>,

    /// Device shown in status reports
    #[arg(long, default_value_t = 0)]
    device: usize,

    /// Stop after this many seconds (0 = run until killed)
    #[arg(long, default_value_t = 0)]
    seconds: u64,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let exit_code = match panic::catch_unwind(|| run(&cli)) {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            log::error!("{}", e);
            1
        }
        Err(_) => {
            log::error!("Fatal error, shutting down");
            1
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: &Cli) -> Result<(), String> {
    let mut settings = match &cli.config {
        Some(path) => load_settings(path)?,
        None => LaserSettings::default(),
    };
    if let Some(port) = cli.port {
        settings.network_port = port;
    }

    let decoder = DecoderAdapter::open(&settings);
    let mut system = BeamLinkSystem::new(settings, decoder);
    if !system.start_network_receiver(cli.bind) {
        return Err(format!(
            "Could not start network receiver on port {}",
            system.settings().network_port
        ));
    }
    log::info!("Listening on port {}", system.settings().network_port);

    let deadline = (cli.seconds > 0).then(|| Instant::now() + Duration::from_secs(cli.seconds));
    let mut last_report = Instant::now();
    let mut frames = 0u32;

    while deadline.map_or(true, |d| Instant::now() < d) {
        let tick_start = Instant::now();
        system.update();
        frames += 1;

        let since_report = last_report.elapsed();
        if since_report >= STATUS_INTERVAL {
            let fps = frames as f32 / since_report.as_secs_f32();
            let report = system.status_report(cli.device);
            if report.warning.is_some() {
                log::warn!("{:.1} FPS\n{}", fps, report);
            } else {
                log::info!("{:.1} FPS\n{}", fps, report);
            }
            last_report = Instant::now();
            frames = 0;
        }

        if let Some(rest) = TICK.checked_sub(tick_start.elapsed()) {
            thread::sleep(rest);
        }
    }

    system.shutdown();
    Ok(())
}
