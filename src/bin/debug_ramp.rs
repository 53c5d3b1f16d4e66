//! Debug script to print ramp height profiles for every curve type

use tiered_terrain::config::SlopeConfig;
use tiered_terrain::level::LevelConfig;
use tiered_terrain::ramp::{build_ramp, transition_length};
use tiered_terrain::slope::{CurveType, SlopeProfile};

fn main() {
    let levels = LevelConfig::default();
    let slope = SlopeConfig::default();
    let cells: Vec<(usize, usize)> = (0..20).map(|x| (x, 0)).collect();
    let cell_size = 100.0;

    println!(
        "Ramp level 0 -> 1: {:.0} units over {} cells of {:.0}, angles {:.0}..{:.0} deg",
        levels.max_height_difference,
        cells.len(),
        cell_size,
        slope.start_angle,
        slope.end_angle
    );

    for &curve in CurveType::all() {
        let profile = SlopeProfile::new(slope.start_angle, slope.end_angle, curve);
        println!();
        println!("== {} ==", curve);

        match build_ramp(&levels, &profile, cell_size, &cells, 0, 1) {
            Ok(ramp) => {
                let mut prev = ramp.heights[0];
                for (i, &h) in ramp.heights.iter().enumerate() {
                    let rise = h - prev;
                    let angle = (rise / cell_size).atan().to_degrees();
                    let bar = "#".repeat((h / levels.max_height_difference * 40.0).round() as usize);
                    println!("{:>3} {:>7.1} {:>+6.1} {:>5.1}deg {}", i, h, rise, angle, bar);
                    prev = h;
                }
                println!("max step {:.1} (limit {:.1})", ramp.max_step(), profile.max_step_rise(cell_size));
            }
            Err(e) => println!("rejected: {}", e),
        }

        for size in [100.0f32, 50.0, 20.0, 10.0] {
            match transition_length(
                &levels,
                &profile,
                size,
                0,
                1,
                slope.min_transition_cells,
                slope.max_transition_cells * 4,
            ) {
                Ok(n) => println!("cell size {:>5.1}: needs {} cells", size, n),
                Err(e) => println!("cell size {:>5.1}: {}", size, e),
            }
        }
    }
}
