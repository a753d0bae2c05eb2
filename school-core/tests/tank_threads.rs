use school_core::{FishState, FishTank};
use school_shared::{ResetMode, TankConfig};

const DT: f32 = 1.0 / 60.0;

fn config(threads: u32) -> TankConfig {
    TankConfig {
        seed: 42,
        schools: 10,
        fish_per_school: Some(20),
        max_schools: 64,
        max_fish_per_school: 20,
        threads,
        max_threads: 4,
        complexity: 3,
        ..TankConfig::default()
    }
}

fn run(tank: &mut FishTank, frames: usize) {
    for _ in 0..frames {
        tank.frame(DT).unwrap();
        tank.complete_frames_through(tank.frame_number());
    }
}

fn all_fish(tank: &FishTank) -> Vec<Vec<FishState>> {
    (0..tank.num_schools())
        .map(|i| tank.with_school(i, |s| s.fish().to_vec()).unwrap())
        .collect()
}

#[test]
fn test_thread_count_does_not_change_results() {
    let mut single = FishTank::new(config(1)).unwrap();
    let mut three = FishTank::new(config(3)).unwrap();
    let mut four = FishTank::new(config(4)).unwrap();
    run(&mut single, 20);
    run(&mut three, 20);
    run(&mut four, 20);

    let expected = all_fish(&single);
    assert_eq!(all_fish(&three), expected);
    assert_eq!(all_fish(&four), expected);
    assert_eq!(single.school_summaries(), four.school_summaries());
}

#[test]
fn test_changing_threads_mid_run() {
    let mut steady = FishTank::new(config(4)).unwrap();
    let mut switching = FishTank::new(config(1)).unwrap();
    run(&mut steady, 10);
    run(&mut switching, 5);
    switching.set_thread_count(2);
    run(&mut switching, 5);
    assert_eq!(all_fish(&steady), all_fish(&switching));
}

#[test]
fn test_more_threads_than_schools() {
    let mut tank = FishTank::new(TankConfig {
        schools: 2,
        ..config(4)
    })
    .unwrap();
    run(&mut tank, 3);
    let stats = tank.stats();
    assert_eq!(stats.schools, 2);
    assert_eq!(stats.fish, 40);
}

#[test]
fn test_threaded_and_main_thread_rendering_match() {
    let mut threaded = FishTank::new(config(4)).unwrap();
    let mut main = FishTank::new(config(4)).unwrap();
    main.set_threaded_rendering(false);
    run(&mut threaded, 3);
    run(&mut main, 3);

    let mut a = threaded.draw_commands();
    let mut b = main.draw_commands();
    a.sort_by_key(|c| (c.school, c.mesh, c.first_instance));
    b.sort_by_key(|c| (c.school, c.mesh, c.first_instance));
    assert_eq!(a, b);
    assert_eq!(threaded.stats().draw_calls, main.stats().draw_calls);
}

#[test]
fn test_growing_the_tank_between_frames() {
    let mut tank = FishTank::new(config(3)).unwrap();
    run(&mut tank, 2);
    tank.set_num_schools(25);
    run(&mut tank, 2);
    assert_eq!(tank.stats().schools, 25);
    assert_eq!(tank.school_summaries().len(), 25);

    tank.set_num_schools(5);
    tank.reset(ResetMode::Fireworks);
    run(&mut tank, 2);
    assert_eq!(tank.created_schools(), 25);
    assert_eq!(tank.stats().fish, 100);
}

#[test]
fn test_shutdown_joins_workers() {
    for threads in 1..=4 {
        let mut tank = FishTank::new(config(threads)).unwrap();
        run(&mut tank, 2);
        drop(tank);
    }
    // A tank that never ran a frame shuts down too
    drop(FishTank::new(config(4)).unwrap());
}
