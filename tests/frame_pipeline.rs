use gravity_sandbox::consts::*;
use glam::DVec2;
use gravity_sandbox::platform::{HeadlessWindow, InputEvent, Key, StatsSink};
use gravity_sandbox::schedule::FrameScheduler;
use gravity_sandbox::sim::SimulationState;

fn assert_buffers_consistent(state: &SimulationState) {
    let buffers = state.buffers();
    assert!(buffers.roles().is_disjoint(), "{:?}", buffers.roles());
    assert_eq!(buffers.slot_lengths(), [state.population(); 4]);
    assert_eq!(state.contacts().len(), state.population());
    assert_eq!(state.params().population, state.population());
}

#[test]
fn test_headless_run_keeps_invariants() {
    let mut scheduler = FrameScheduler::new(3, 2).expect("scheduler");
    let mut state = SimulationState::new(2024, 50);
    state.wire(scheduler.layout()).expect("wire");

    let mut window = HeadlessWindow::new(1200, 600)
        .with_event(0, InputEvent::Press(Key::G))
        .with_event(0, InputEvent::Press(Key::C))
        .with_event(3, InputEvent::Press(Key::R))
        .with_event(10, InputEvent::Press(Key::B))
        .with_event(12, InputEvent::Repeat(Key::Up))
        .with_event(14, InputEvent::Resize { width: 600, height: 600 })
        .with_frame_limit(20);
    let mut sink = StatsSink::default();

    while !state.should_stop() {
        let stats = scheduler
            .run_frame(&mut state, &mut window, &mut sink)
            .expect("frame");
        assert_buffers_consistent(&state);
        assert!(stats.step > 0.0);
        assert!(stats.kinetic_energy.is_finite());
        assert_eq!(stats.population, state.population());
        assert!(stats.physics_runs >= 1 && stats.physics_runs <= 2);

        // Widest border of the run (1200x600 before the resize)
        let widest = DVec2::new(2.0, 1.0) + 1e-9;
        for body in state.render_buffer() {
            assert!(body.position.is_finite());
            assert!(body.position.abs().cmple(widest).all(), "{body:?} escaped");
        }
    }

    assert_eq!(state.frame(), 20);
    assert_eq!(sink.frames, 20);
    assert!(state.params().down_gravity);
    assert!(state.params().object_collision);
    assert!(state.params().relative_gravity);
    assert!(!state.params().border_collision);
    assert_eq!(state.population(), 50 + 50 / 11 + 1);
    assert_eq!(state.params().border.x, 1.0);
}

#[test]
fn test_population_shrink_mid_run() {
    let mut scheduler = FrameScheduler::new(4, 1).expect("scheduler");
    let mut state = SimulationState::new(7, 50);
    state.set_object_collision(true);
    state.set_down_gravity(true);
    state.wire(scheduler.layout()).expect("wire");
    let mut window = HeadlessWindow::new(800, 800);
    let mut sink = StatsSink::default();

    for _ in 0..5 {
        scheduler.run_frame(&mut state, &mut window, &mut sink).expect("frame");
    }
    state.set_population(10);
    let stats = scheduler.run_frame(&mut state, &mut window, &mut sink).expect("frame");

    assert_eq!(stats.population, 10);
    assert_buffers_consistent(&state);
    assert_eq!(sink.population, 10);
    for i in 0..10 {
        let contacts = state.contacts().get(i).expect("contact set");
        assert!(contacts.as_slice().iter().all(|&j| (j as usize) < 10));
    }

    // Between frames the index holds exactly the surviving bodies
    let index = state.spatial_index();
    assert_eq!(index.len(), 10);
    let mut seen = Vec::new();
    index.visit_radius(DVec2::ZERO, 100.0, |i| {
        seen.push(i);
        false
    });
    assert!(seen.iter().all(|&i| i < 10));
    assert_eq!(seen.len(), 10);
}

#[test]
fn test_population_keys_respect_bounds() {
    let mut scheduler = FrameScheduler::new(1, 1).expect("scheduler");
    let mut state = SimulationState::new(1, MIN_BODIES + 2);
    state.wire(scheduler.layout()).expect("wire");
    let mut window = HeadlessWindow::default()
        .with_event(0, InputEvent::Press(Key::Down))
        .with_event(1, InputEvent::Repeat(Key::Down))
        .with_frame_limit(3);
    let mut sink = StatsSink::default();
    let last = scheduler
        .run(&mut state, &mut window, &mut sink)
        .expect("run")
        .expect("stats");
    assert_eq!(last.population, MIN_BODIES);
    assert_eq!(sink.kinetic_energy, 0.0);
}
