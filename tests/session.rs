use ledpanel::{
    config::{Config, ServerConfig},
    error::OutOfRange,
    gateway::{CallLog, GatewayCall, RecordingGateway},
    pattern::{Diagonal, Mode, Pattern, Solid, Sweep},
    pixel_buffer::{Canvas, Color},
    protocol::{Command, ACK},
    session::Session,
    Error,
};
use std::{
    io::{Read, Write},
    net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream},
    thread,
    time::{Duration, Instant},
};

fn gateway() -> (RecordingGateway, CallLog) {
    let gateway = RecordingGateway::new().with_latency(Duration::from_micros(200));
    let log = gateway.log();
    (gateway, log)
}

fn wait_for(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(3);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(1));
    }
}

struct Overrun;
impl Pattern for Overrun {
    fn name(&self) -> &str {
        "overrun"
    }
    fn mode(&self) -> Mode {
        Mode::OneShot
    }
    fn draw(&mut self, canvas: &dyn Canvas, _frame: u64) -> Result<(), OutOfRange> {
        for x in 0..=canvas.width() {
            canvas.set_pixel(x, 0, Color::RED)?;
        }
        Ok(())
    }
}

/// Continuous pattern whose every draw outlasts the shutdown timeout.
struct Stalled;
impl Pattern for Stalled {
    fn name(&self) -> &str {
        "stalled"
    }
    fn mode(&self) -> Mode {
        Mode::Continuous {
            frame_interval: Duration::from_millis(1),
        }
    }
    fn draw(&mut self, canvas: &dyn Canvas, _frame: u64) -> Result<(), OutOfRange> {
        canvas.set_pixel(0, 0, Color::WHITE)?;
        thread::sleep(Duration::from_secs(2));
        Ok(())
    }
}

#[test]
fn diagonal_on_32_by_16() {
    let (gateway, log) = gateway();
    let session = Session::start(
        &Config::headless(32, 16),
        gateway,
        vec![Box::new(Diagonal::new(Color::WHITE))],
    )
    .unwrap();

    wait_for(|| log.last_commit().is_some_and(|f| f.lit() == 16));
    let frame = session.buffer().snapshot();
    for y in 0..16 {
        for x in 0..32 {
            let expected = if x == y { Color::WHITE } else { Color::BLACK };
            assert_eq!(frame.get(x, y), Some(expected), "at ({x}, {y})");
        }
    }

    let report = session.shutdown().unwrap();
    assert_eq!(report.generators.len(), 1);
    assert_eq!(report.generators[0].result, Ok(1));
}

#[test]
fn exactly_one_blank_commit_after_stop() {
    let (gateway, log) = gateway();
    let session = Session::start(
        &Config::headless(32, 16),
        gateway,
        vec![Box::new(Solid::new(Color::YELLOW))],
    )
    .unwrap();
    wait_for(|| log.last_commit().is_some_and(|f| f.lit() == 32 * 16));

    let report = session.shutdown().unwrap();
    assert!(report.panel_blanked);
    assert_eq!(log.commits(), report.refresh_frames + 1);
    assert!(log.last_commit().unwrap().is_dark());

    thread::sleep(Duration::from_millis(20));
    assert_eq!(log.commits(), report.refresh_frames + 1);
    assert_eq!(log.init_calls(), 1);
}

#[test]
fn stop_mid_refresh_is_bounded() {
    let (gateway, log) = gateway();
    let mut config = Config::headless(16, 16);
    config.shutdown_timeout = Duration::from_millis(500);
    let session = Session::start(
        &config,
        gateway,
        vec![Box::new(Sweep::new(Duration::from_millis(2)))],
    )
    .unwrap();
    wait_for(|| log.commits() > 20);

    let started = Instant::now();
    let report = session.shutdown().unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(report.generators[0].result.unwrap() > 0);
    assert!(log.last_commit().unwrap().is_dark());
}

#[test]
fn init_failure_starts_nothing() {
    let gateway = RecordingGateway::new().failing_init("gpio unavailable");
    let log = gateway.log();
    let Err(err) = Session::start(&Config::headless(32, 16), gateway, Vec::new()) else {
        panic!("session started without hardware");
    };
    assert!(matches!(err, Error::InitFailure(_)));
    assert_eq!(log.init_calls(), 1);
    assert_eq!(log.commits(), 0);
}

#[test]
fn invalid_dimensions_touch_no_hardware() {
    let (gateway, log) = gateway();
    let Err(err) = Session::start(&Config::headless(0, 16), gateway, Vec::new()) else {
        panic!("zero width accepted");
    };
    assert!(matches!(err, Error::InvalidDimensions { .. }));
    assert_eq!(log.init_calls(), 0);
}

#[test]
fn failed_bind_still_blanks_panel() {
    let taken = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let mut config = Config::headless(8, 8);
    config.server = Some(ServerConfig {
        bind: taken.local_addr().unwrap(),
        ..ServerConfig::loopback()
    });

    let (gateway, log) = gateway();
    let Err(err) = Session::start(&config, gateway, Vec::new()) else {
        panic!("bound an address that is in use");
    };
    assert!(matches!(err, Error::Io(_)));
    assert!(log.commits() >= 1);
    assert!(log.last_commit().unwrap().is_dark());
}

#[test]
fn dropping_a_session_blanks_panel() {
    let (gateway, log) = gateway();
    let session = Session::start(
        &Config::headless(8, 8),
        gateway,
        vec![Box::new(Solid::new(Color::RED))],
    )
    .unwrap();
    wait_for(|| log.last_commit().is_some_and(|f| f.lit() == 64));

    drop(session);
    assert!(log.last_commit().unwrap().is_dark());
}

#[test]
fn broken_generator_is_isolated() {
    let (gateway, log) = gateway();
    let session = Session::start(
        &Config::headless(8, 4),
        gateway,
        vec![Box::new(Overrun), Box::new(Diagonal::new(Color::GREEN))],
    )
    .unwrap();

    wait_for(|| log.last_commit().is_some_and(|f| f.get(3, 3) == Some(Color::GREEN)));
    let before = log.commits();
    wait_for(|| log.commits() > before + 5);

    let report = session.shutdown().unwrap();
    let overrun = &report.generators[0];
    assert_eq!(overrun.name, "pattern:overrun");
    assert_eq!(
        overrun.result,
        Err(OutOfRange {
            x: 8,
            y: 0,
            width: 8,
            height: 4
        })
    );
    assert_eq!(report.generators[1].result, Ok(1));
}

#[test]
fn network_writes_reach_the_panel() {
    let (gateway, log) = gateway();
    let mut config = Config::headless(32, 16);
    config.server = Some(ServerConfig::loopback());
    let session = Session::start(&config, gateway, Vec::new()).unwrap();
    let addr: SocketAddr = session.server_addr().unwrap();

    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    let mut bytes = Command::SetPixel {
        x: 31,
        y: 15,
        color: Color::MAGENTA,
    }
    .to_bytes();
    Command::Sync.encode(&mut bytes);
    stream.write_all(&bytes).unwrap();
    let mut ack = [0u8; 1];
    stream.read_exact(&mut ack).unwrap();
    assert_eq!(ack[0], ACK);

    wait_for(|| log.last_commit().is_some_and(|f| f.get(31, 15) == Some(Color::MAGENTA)));

    let report = session.shutdown().unwrap();
    assert_eq!(report.server.unwrap().accepted, 1);
    assert!(log.last_commit().unwrap().is_dark());
}

#[test]
fn stalled_generator_times_out_and_panel_is_still_blanked() {
    let (gateway, log) = gateway();
    let mut config = Config::headless(8, 8);
    config.shutdown_timeout = Duration::from_millis(200);
    let session = Session::start(&config, gateway, vec![Box::new(Stalled)]).unwrap();
    wait_for(|| log.last_commit().is_some_and(|f| f.lit() == 1));

    let started = Instant::now();
    let err = session.shutdown().unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(1));
    match err {
        Error::ShutdownTimeout { component, waited } => {
            assert_eq!(component, "pattern:stalled");
            assert_eq!(waited, Duration::from_millis(200));
        }
        other => panic!("unexpected error: {other}"),
    }
    // The stalled pixel was cleared from the buffer before the final commit.
    assert!(log.last_commit().unwrap().is_dark());
}

#[test]
fn failed_blank_commit_falls_back_to_clear() {
    let gateway = RecordingGateway::new().failing_commits(u64::MAX);
    let log = gateway.log();
    let session = Session::start(&Config::headless(4, 4), gateway, Vec::new()).unwrap();
    wait_for(|| log.commits() > 3);

    let err = session.shutdown().unwrap_err();
    assert!(matches!(err, Error::Gateway(_)));
    assert_eq!(log.clears(), 1);
    assert_eq!(log.recent().last(), Some(&GatewayCall::Clear));
}
