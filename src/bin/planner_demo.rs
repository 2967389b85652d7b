//! Thin demo binary exercising the planning core end-to-end with synthetic ribbons,
//! obstacles and a logging observer standing in for the external transport layer.

extern crate pretty_env_logger;
#[macro_use]
extern crate log;

use std::sync::Arc;
use std::time::Duration;

use clap::{App, Arg};

use asv_path_planner::config::{PlannerConfig, WhichPlanner};
use asv_path_planner::executive::{Executive, ExecutiveEvent, LoggingObserver};

fn parse_which_planner(s: &str) -> WhichPlanner {
    match s {
        "potential_field" => WhichPlanner::PotentialField,
        "bitstar" => WhichPlanner::BitStar,
        _ => WhichPlanner::AStar,
    }
}

fn main() {
    pretty_env_logger::init();

    let matches = App::new("planner_demo")
        .version("0.1.0")
        .about("Runs the ribbon-coverage planner against a synthetic scenario")
        .arg(
            Arg::with_name("planner")
                .long("planner")
                .takes_value(true)
                .possible_values(&["potential_field", "astar", "bitstar"])
                .default_value("astar"),
        )
        .arg(
            Arg::with_name("seconds")
                .long("seconds")
                .takes_value(true)
                .default_value("5")
                .help("how long to let the demo executive run before terminating it"),
        )
        .get_matches();

    let mut config = PlannerConfig::default();
    config.which_planner = parse_which_planner(matches.value_of("planner").unwrap());

    let observer = Arc::new(LoggingObserver::default());
    let executive = Executive::new(config, observer);

    executive.dispatch(ExecutiveEvent::AddRibbon { x1: 0., y1: 0., x2: 100., y2: 0. });
    executive.dispatch(ExecutiveEvent::AddRibbon { x1: 100., y1: 0., x2: 100., y2: 60. });
    executive.dispatch(ExecutiveEvent::SetPlanningTime(1.0));
    executive.dispatch(ExecutiveEvent::UpdateCovered { x: -20., y: 0., speed: 2.0, heading: std::f64::consts::FRAC_PI_2, t: 0. });
    executive.dispatch(ExecutiveEvent::StartPlanner);

    let run_secs: u64 = matches.value_of("seconds").unwrap().parse().unwrap_or(5);
    info!("demo executive running for {} s", run_secs);
    std::thread::sleep(Duration::from_secs(run_secs));

    executive.dispatch(ExecutiveEvent::Terminate);
    info!("demo executive terminated");
}
