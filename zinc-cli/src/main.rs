// vim: tw=80

//! Admin CLI for the zinc scheduler. There is no persistent driver to
//! attach to in this tree, so `show`/`set` operate on a freshly
//! constructed default configuration (useful for exploring clamping
//! behavior) and `demo`/`stats` run a small self-contained workload
//! against the in-memory reference device.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::info;

use zinc::common::classifier::OpCode;
use zinc::common::clock::TestClock;
use zinc::common::config::SchedulerConfig;
use zinc::common::refdev::RefDevice;
use zinc::common::request::{BasicRequest, Priority, RequestHandle};
use zinc::common::scheduler::Scheduler;

#[derive(Parser)]
#[command(name = "zinc-cli", about = "Admin surface for the zinc zoned-device scheduler")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the default scheduler configuration.
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Apply a value to one knob of a fresh default configuration and
    /// print the (possibly clamped) result.
    Set {
        knob: String,
        value: u64,
    },
    /// Run the built-in demo workload and print final counters.
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Run the built-in demo workload, narrating each dispatch.
    Demo {
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Show { json } => show(json),
        Command::Set { knob, value } => set(&knob, value),
        Command::Stats { json } => run_demo(json, false),
        Command::Demo { json } => run_demo(json, true),
    }
}

fn show(json: bool) {
    let config = SchedulerConfig::default();
    let snapshot = serde_json::json!({
        "read_expire_ms": config.read_expire().as_millis() as u64,
        "write_expire_ms": config.write_expire().as_millis() as u64,
        "writes_starved": config.writes_starved(),
        "fifo_batch": config.fifo_batch(),
        "front_merges": config.front_merges_enabled(),
        "prio_aging_expire_ms": config.prio_aging_expire().as_millis() as u64,
        "reset": {
            "epoch_interval_ms": config.reset.epoch_interval().as_millis() as u64,
            "command_tokens": config.reset.command_tokens(),
            "minimum_concurrency_threshold": config.reset.minimum_concurrency_threshold(),
            "maximum_epoch_holds": config.reset.maximum_epoch_holds(),
        },
        "finish": {
            "epoch_interval_ms": config.finish.epoch_interval().as_millis() as u64,
            "command_tokens": config.finish.command_tokens(),
            "minimum_concurrency_threshold": config.finish.minimum_concurrency_threshold(),
            "maximum_epoch_holds": config.finish.maximum_epoch_holds(),
        },
    });

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot).unwrap());
    } else {
        println!("{}", snapshot);
    }
}

fn set(knob: &str, value: u64) {
    let config = SchedulerConfig::default();
    let applied = match knob {
        "read_expire_ms" => config.set_read_expire_ms(value),
        "write_expire_ms" => config.set_write_expire_ms(value),
        "writes_starved" => {
            config.set_writes_starved(value as u32);
            value
        }
        "fifo_batch" => config.set_fifo_batch(value as u32) as u64,
        "prio_aging_expire_ms" => {
            config.set_prio_aging_expire_ms(value);
            value
        }
        "reset.epoch_interval_ms" => config.reset.set_epoch_interval_ms(value),
        "reset.command_tokens" => {
            config.reset.set_command_tokens(value);
            value
        }
        "reset.minimum_concurrency_threshold" => {
            config.reset.set_minimum_concurrency_threshold(value);
            value
        }
        "reset.maximum_epoch_holds" => {
            config.reset.set_maximum_epoch_holds(value as u32);
            value
        }
        "finish.epoch_interval_ms" => config.finish.set_epoch_interval_ms(value),
        "finish.command_tokens" => {
            config.finish.set_command_tokens(value);
            value
        }
        "finish.minimum_concurrency_threshold" => {
            config.finish.set_minimum_concurrency_threshold(value);
            value
        }
        "finish.maximum_epoch_holds" => {
            config.finish.set_maximum_epoch_holds(value as u32);
            value
        }
        other => {
            eprintln!("unknown knob: {other}");
            std::process::exit(1);
        }
    };
    println!("{knob} = {applied}");
}

/// A representative mix of requests across priorities and directions,
/// plus a reset and a finish, run against the in-memory reference
/// device with a manually-advanced clock.
fn run_demo(json: bool, narrate: bool) {
    let dev = Arc::new(RefDevice::new(8, 4096, false));
    let clock = TestClock::new();
    let config = SchedulerConfig::default();
    config.reset.set_epoch_interval_ms(1);
    config.finish.set_epoch_interval_ms(1);
    let sched = Scheduler::attach_with_clock(dev, Arc::clone(&clock), Arc::new(config));

    let workload: Vec<RequestHandle> = vec![
        Arc::new(BasicRequest::new(OpCode::Read, 0, 8, 0, Priority::RealTime)),
        Arc::new(BasicRequest::new(OpCode::Write, 16, 8, 1, Priority::BestEffort)),
        Arc::new(BasicRequest::new(OpCode::Write, 8, 8, 1, Priority::BestEffort)),
        Arc::new(BasicRequest::new(OpCode::Read, 0, 8, 2, Priority::Idle)),
        Arc::new(BasicRequest::management(OpCode::ZoneReset, 3, Priority::BestEffort)),
        Arc::new(BasicRequest::management(OpCode::ZoneFinish, 4, Priority::BestEffort)),
    ];

    for req in workload {
        if sched.insert(req).is_err() {
            continue;
        }
    }

    clock.advance(Duration::from_millis(5));

    let mut dispatched = Vec::new();
    while let Some(req) = sched.dispatch() {
        if narrate {
            info!("dispatched op={:?} zone={}", req.op(), req.zone());
        }
        sched.complete(&req);
        dispatched.push(format!("{:?}@zone{}", req.op(), req.zone()));
    }

    let stats = sched.stats();
    if json {
        let out = serde_json::json!({
            "dispatched": dispatched,
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&out).unwrap());
    } else {
        for d in &dispatched {
            println!("dispatched: {d}");
        }
        println!("{:#?}", stats.priorities.iter().map(|p| (&p.priority, p.dispatched)).collect::<Vec<_>>());
    }

    sched.detach();
}
