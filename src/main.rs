use clap::Parser;
use ledpanel::{
    config::{Config, ServerConfig, DEFAULT_HEIGHT, DEFAULT_PORT, DEFAULT_WIDTH},
    gateway::SimulatedPanel,
    pattern::{self, Pattern},
    session::Session,
    Error,
};
use log::{error, info};
use std::{
    net::{IpAddr, SocketAddr},
    process::ExitCode,
    time::Duration,
};

mod operator;

const EXIT_INIT_FAILURE: u8 = 1;
const EXIT_FATAL: u8 = 2;

/// Drive an RGB LED matrix and accept pixel updates over TCP.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    #[arg(long, default_value_t = DEFAULT_WIDTH)]
    width: u32,
    #[arg(long, default_value_t = DEFAULT_HEIGHT)]
    height: u32,
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Run without the network control channel.
    #[arg(long)]
    no_server: bool,
    #[arg(long, default_value_t = 16)]
    max_connections: usize,
    /// Pattern drawn at startup: test-card, diagonal, sweep or none.
    #[arg(long, default_value = "test-card")]
    pattern: String,
    /// Time one simulated panel commit takes.
    #[arg(long, default_value_t = 500)]
    commit_latency_us: u64,
    #[arg(long, default_value_t = 2000)]
    shutdown_timeout_ms: u64,
}
impl Args {
    fn config(&self) -> Config {
        let server = (!self.no_server).then(|| ServerConfig {
            bind: SocketAddr::new(self.bind, self.port),
            max_connections: self.max_connections,
            ..ServerConfig::default()
        });
        Config {
            width: self.width,
            height: self.height,
            server,
            shutdown_timeout: Duration::from_millis(self.shutdown_timeout_ms),
            ..Config::default()
        }
    }

    fn patterns(&self) -> Option<Vec<Box<dyn Pattern>>> {
        if self.pattern == "none" {
            return Some(Vec::new());
        }
        pattern::by_name(&self.pattern).map(|p| vec![p])
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let Some(patterns) = args.patterns() else {
        error!("unknown pattern {:?}", args.pattern);
        return ExitCode::from(EXIT_FATAL);
    };

    info!("Starting the LED controller");
    let gateway = SimulatedPanel::new(Duration::from_micros(args.commit_latency_us));
    let session = match Session::start(&args.config(), gateway, patterns) {
        Ok(session) => session,
        Err(err @ Error::InitFailure(_)) => {
            error!("{err}");
            return ExitCode::from(EXIT_INIT_FAILURE);
        }
        Err(err) => {
            error!("startup failed: {err}");
            return ExitCode::from(EXIT_FATAL);
        }
    };
    if let Some(addr) = session.server_addr() {
        info!("accepting pixel commands on {addr}");
    }

    println!("Press <RETURN> to exit and reset LEDs");
    let trigger = operator::wait_for_shutdown();
    info!("{trigger}, stopping");

    match session.shutdown() {
        Ok(report) => {
            info!(
                "clean shutdown after {} frames ({} faults)",
                report.refresh_frames, report.refresh_faults
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("shutdown failed: {err}");
            // Threads that would not stop must not outlive the process.
            std::process::exit(i32::from(EXIT_FATAL));
        }
    }
}
