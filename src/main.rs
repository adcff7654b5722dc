//! Gravity Sandbox headless runner
//!
//! Loads settings (first argument, or `gravity-sandbox.conf`), runs the
//! simulation for the configured number of frames against the headless
//! window, and prints the last frame's statistics as JSON.

use gravity_sandbox::platform::{HeadlessWindow, StatsSink};
use gravity_sandbox::schedule::FrameScheduler;
use gravity_sandbox::settings::SETTINGS_FILE;
use gravity_sandbox::sim::SimulationState;
use gravity_sandbox::{Result, Settings};

fn run() -> Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| SETTINGS_FILE.to_string());
    let settings = Settings::load(&path)?;
    if let Ok(json) = settings.to_json() {
        log::debug!("settings: {json}");
    }

    let mut scheduler = FrameScheduler::new(settings.concurrency, settings.max_physics_runs)?;
    let mut state = SimulationState::new(settings.seed, settings.bodies);
    state.set_fidelity(settings.fidelity);
    state.wire(scheduler.layout())?;

    let mut window = HeadlessWindow::default().with_frame_limit(settings.frames);
    let mut sink = StatsSink::default();

    log::info!(
        "running {} frames with {} bodies (seed {})",
        settings.frames,
        state.population(),
        settings.seed
    );
    let last = scheduler.run(&mut state, &mut window, &mut sink)?;

    match last.map(|stats| serde_json::to_string_pretty(&stats)) {
        Some(Ok(json)) => println!("{json}"),
        Some(Err(err)) => log::error!("failed to encode frame stats: {err}"),
        None => log::warn!("no frames were run"),
    }
    Ok(())
}

fn main() {
    env_logger::init();
    log::info!("Gravity Sandbox starting...");

    if let Err(err) = run() {
        log::error!("{err}");
        std::process::exit(1);
    }
}
