use std::{net::SocketAddr, sync::Arc, time::Duration};

use log::{error, info, warn};

use crate::{
    config::Config,
    error::{Error, OutOfRange},
    gateway::HardwareGateway,
    pattern::{Pattern, PatternGenerator},
    pixel_buffer::{Canvas, PixelBuffer},
    refresh::{RefreshDriver, RefreshStats},
    server::{ControlServer, ServerReport},
    worker::Worker,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratorOutcome {
    pub name: String,
    pub result: Result<u64, OutOfRange>,
}

#[derive(Clone, Debug, Default)]
pub struct ShutdownReport {
    /// Commits made by the refresh loop, not counting the final blank one.
    pub refresh_frames: u64,
    pub refresh_faults: u64,
    pub generators: Vec<GeneratorOutcome>,
    pub server: Option<ServerReport>,
    pub panel_blanked: bool,
}

/// Owns everything that runs while the panel is lit.
///
/// Start order is buffer, refresh, control server, generators. Shutdown runs
/// the other way round and ends with a single all-black commit. Dropping a
/// session that was not shut down explicitly runs the same sequence.
pub struct Session<G: HardwareGateway> {
    buffer: Arc<PixelBuffer>,
    refresh: Option<Worker<G>>,
    refresh_stats: Arc<RefreshStats>,
    server: Option<Worker<ServerReport>>,
    server_addr: Option<SocketAddr>,
    generators: Vec<Worker<Result<u64, OutOfRange>>>,
    shutdown_timeout: Duration,
    finished: bool,
}
impl<G: HardwareGateway> Session<G> {
    pub fn start(
        config: &Config,
        mut gateway: G,
        patterns: Vec<Box<dyn Pattern>>,
    ) -> Result<Self, Error> {
        let buffer = Arc::new(PixelBuffer::new(config.width, config.height)?);
        gateway.init()?;
        info!("panel initialised, {}x{}", config.width, config.height);

        let driver = RefreshDriver::new(Arc::clone(&buffer), gateway, config.refresh.clone());
        let refresh_stats = driver.stats();
        let refresh = driver.spawn()?;

        // From here on, any early return drops the session, which stops the
        // refresher and blanks the panel.
        let mut session = Self {
            buffer,
            refresh: Some(refresh),
            refresh_stats,
            server: None,
            server_addr: None,
            generators: Vec::new(),
            shutdown_timeout: config.shutdown_timeout,
            finished: false,
        };

        if let Some(server_config) = &config.server {
            let canvas: Arc<dyn Canvas> = session.buffer.clone();
            let server = ControlServer::bind(canvas, server_config.clone())?;
            session.server_addr = Some(server.local_addr()?);
            session.server = Some(server.spawn()?);
        }

        for pattern in patterns {
            let canvas: Arc<dyn Canvas> = session.buffer.clone();
            let worker = PatternGenerator::new(pattern, canvas).spawn()?;
            session.generators.push(worker);
        }

        Ok(session)
    }

    pub fn buffer(&self) -> &Arc<PixelBuffer> {
        &self.buffer
    }
    pub fn server_addr(&self) -> Option<SocketAddr> {
        self.server_addr
    }
    pub fn refresh_stats(&self) -> &RefreshStats {
        &self.refresh_stats
    }

    pub fn shutdown(mut self) -> Result<ShutdownReport, Error> {
        self.stop_all()
    }

    fn stop_all(&mut self) -> Result<ShutdownReport, Error> {
        self.finished = true;
        let timeout = self.shutdown_timeout;
        let mut report = ShutdownReport::default();
        let mut failure: Option<Error> = None;
        let mut record = |err: Error| {
            error!("{err}");
            failure.get_or_insert(err);
        };

        for generator in &self.generators {
            generator.request_stop();
        }
        for generator in self.generators.drain(..) {
            let name = generator.name().to_owned();
            match generator.join_timeout(timeout) {
                Ok(result) => {
                    if let Err(err) = &result {
                        warn!("{name} drew outside the panel: {err}");
                    }
                    report.generators.push(GeneratorOutcome { name, result });
                }
                Err(err) => record(err),
            }
        }

        if let Some(server) = self.server.take() {
            match server.stop(timeout) {
                Ok(server_report) => {
                    if server_report.stuck > 0 {
                        record(Error::ShutdownTimeout {
                            component: format!("{} control connection(s)", server_report.stuck),
                            waited: timeout,
                        });
                    }
                    report.server = Some(server_report);
                }
                Err(err) => record(err),
            }
        }

        let gateway = match self.refresh.take() {
            Some(refresh) => match refresh.stop(timeout) {
                Ok(gateway) => Some(gateway),
                Err(err) => {
                    record(err);
                    None
                }
            },
            None => None,
        };
        report.refresh_frames = self.refresh_stats.frames();
        report.refresh_faults = self.refresh_stats.faults();

        self.buffer.clear();
        match gateway {
            Some(mut gateway) => match gateway.commit(&self.buffer.snapshot()) {
                Ok(()) => {
                    report.panel_blanked = true;
                    info!("panel blanked");
                }
                Err(fault) => {
                    record(fault.into());
                    // Last resort: ask the driver to switch every LED off.
                    match gateway.clear() {
                        Ok(()) => {
                            report.panel_blanked = true;
                            warn!("panel blanked through clear after a failed commit");
                        }
                        Err(fault) => record(fault.into()),
                    }
                }
            },
            None => error!("refresh thread kept the panel, it could not be blanked"),
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }
}
impl<G: HardwareGateway> Drop for Session<G> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(err) = self.stop_all() {
                error!("shutdown on drop failed: {err}");
            }
        }
    }
}
