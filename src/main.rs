//! displayd - main entry point.
//!
//! Bootstrap order matters: devices before the socket, the socket before
//! the session child, readiness signaling last.

use std::env;
use std::os::unix::net::UnixListener;
use std::path::Path;

use clap::Parser;
use log::{error, info, warn};

use displayd::args::Args;
use displayd::config::Config;
use displayd::device::{FbDevice, KeyboardDevice, PointerDevice, VideoOutput};
use displayd::gfx::font::Font;
use displayd::scene::Display;
use displayd::server::Server;
use displayd::session;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::new()
        .parse_filters(&format!("displayd={}", log_level))
        .init();

    info!("displayd v{} starting", env!("CARGO_PKG_VERSION"));

    let mut config = match args.load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    apply_cli_overrides(&mut config, &args);

    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    match run(config, &args.session) {
        Ok(code) => {
            info!("displayd stopped with code {}", code);
            std::process::exit(code);
        }
        Err(e) => {
            eprintln!("Fatal error: {}", e);
            error!("Fatal error: {}", e);
            std::process::exit(1);
        }
    }
}

fn run(config: Config, session_argv: &[String]) -> Result<i32, Box<dyn std::error::Error>> {
    // The server signals and reaps its own children; sharing a process
    // group with the invoker would misdirect those signals.
    if unsafe { libc::getpgid(0) } != unsafe { libc::getpid() } {
        return Err("displayd must be invoked in its own process group".into());
    }

    let video = FbDevice::open(&config.devices.video)?;
    let keyboard = KeyboardDevice::open(&config.devices.keyboard)?;
    let pointer = PointerDevice::open(&config.devices.pointer)?;
    let font = Font::load(&config.devices.font)?;
    let mode = video.current_mode();
    info!("display mode {}x{}", mode.view_xres, mode.view_yres);

    let display = Display::new(mode, font, wallpaper_seed(), config.session.terminal.clone())
        .ok_or("out of memory for the initial framebuffers")?;

    let socket_path = &config.socket.path;
    remove_stale_socket(socket_path);
    let listener = UnixListener::bind(socket_path)?;
    info!("listening on {}", socket_path.display());
    env::set_var(session::SOCKET_ENV, socket_path);

    let _session = session::spawn_session(session_argv, socket_path);
    session::notify_ready();

    let mut server = Server::new(display, listener, video, keyboard, pointer)?;
    let code = server.run()?;
    let _ = std::fs::remove_file(socket_path);
    Ok(code)
}

fn apply_cli_overrides(config: &mut Config, args: &Args) {
    if let Some(ref mouse) = args.mouse {
        config.devices.pointer = mouse.clone();
    }
    if let Some(ref tty) = args.tty {
        config.devices.keyboard = tty.clone();
    }
    if let Some(ref socket) = args.socket {
        config.socket.path = socket.clone();
    }
}

/// One entropy read seeds the wallpaper for the whole session.
fn wallpaper_seed() -> u64 {
    use std::io::Read;
    let mut bytes = [0u8; 8];
    match std::fs::File::open("/dev/urandom").and_then(|mut f| f.read_exact(&mut bytes)) {
        Ok(()) => u64::from_le_bytes(bytes),
        Err(_) => {
            warn!("no entropy source, wallpaper uses the fixed seed");
            0x5D15_0DE5_D15B_0A2D
        }
    }
}

fn remove_stale_socket(path: &Path) {
    use std::os::unix::net::UnixStream;
    if !path.exists() {
        return;
    }
    if UnixStream::connect(path).is_ok() {
        // Somebody is alive on the other end; bind() will fail loudly.
        warn!("{} is in use by another server", path.display());
        return;
    }
    let _ = std::fs::remove_file(path);
}
