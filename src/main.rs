use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};

use slope_tracker::api::ApiClient;
use slope_tracker::archive;
use slope_tracker::config::TrackerConfig;
use slope_tracker::credentials::{CredentialStore, FileCredentialStore, StaticCredentials};
use slope_tracker::inactivity::InactivityMonitor;
use slope_tracker::live_status::LiveStatus;
use slope_tracker::sensors::{simulate_motion, simulate_positions, MotionHub, PositionHub, PositionSource, Waypoint};
use slope_tracker::session::{SessionController, SessionState};

#[derive(Parser, Debug)]
#[command(name = "slope_tracker")]
#[command(about = "Record a route session from simulated sensors", long_about = None)]
struct Args {
    /// JSON config file (defaults apply when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON file holding `token` and `selected_mountain`
    #[arg(long)]
    credentials: Option<PathBuf>,

    /// Route name, resolved to a run id on save
    #[arg(long, default_value = "Demo Run")]
    route: String,

    /// Recording time in seconds (0 = until the simulated route ends)
    #[arg(long, default_value = "0")]
    duration: u64,

    /// Output directory for live status and archived sessions
    #[arg(long, default_value = "slope_tracker_sessions")]
    output_dir: PathBuf,

    /// Pin the location, e.g. `45.92,6.87`
    #[arg(long, value_name = "LAT,LON", value_parser = parse_fixed_location)]
    fixed_location: Option<(f64, f64)>,

    /// Submit the session to the backend when it ends
    #[arg(long)]
    submit: bool,
}

fn parse_fixed_location(value: &str) -> Result<(f64, f64), String> {
    let (lat, lon) = value
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LON, got '{}'", value))?;
    let lat: f64 = lat.trim().parse().map_err(|e| format!("bad latitude: {}", e))?;
    let lon: f64 = lon.trim().parse().map_err(|e| format!("bad longitude: {}", e))?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(format!("{},{} is out of range", lat, lon));
    }
    Ok((lat, lon))
}

/// A straight descent with a gentle zigzag, one point per second
fn demo_route(points: usize) -> Vec<Waypoint> {
    let (start_lat, start_lon, start_alt) = (45.9237, 6.8694, 2400.0);
    (0..points)
        .map(|i| {
            let i = i as f64;
            Waypoint {
                latitude: start_lat - i * 0.00006,
                longitude: start_lon + (i * 0.3).sin() * 0.00004,
                altitude: start_alt - i * 1.5,
            }
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => TrackerConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => TrackerConfig::default(),
    };

    println!("[{}] Slope Tracker Starting", ts_now());
    println!("  Route: {}", args.route);
    println!("  Duration: {} seconds (0=until route ends)", args.duration);
    println!("  Backend: {}", config.api.base_url);
    println!("  Submit: {}", args.submit);
    println!("  Output Dir: {}", args.output_dir.display());

    std::fs::create_dir_all(&args.output_dir)?;

    let credentials: Arc<dyn CredentialStore> = match &args.credentials {
        Some(path) => Arc::new(FileCredentialStore::new(path)),
        None => Arc::new(StaticCredentials::default()),
    };
    let api = Arc::new(ApiClient::new(&config.api, credentials.clone()));
    let positions = Arc::new(PositionHub::new());
    let motion = Arc::new(MotionHub::new());

    let monitor = InactivityMonitor::start(&config.inactivity, motion.clone(), positions.clone(), api.clone())?;
    let controller = SessionController::new(config.clone(), positions.clone(), api.clone(), api.clone(), credentials);

    let session_id = controller.start(args.route.clone())?;
    if let Some((lat, lon)) = args.fixed_location {
        controller.set_fixed_location(lat, lon)?;
    }

    let route_task = tokio::spawn(simulate_positions(positions.clone(), demo_route(240), Duration::from_secs(1)));
    let motion_task = tokio::spawn(simulate_motion(motion.clone(), Duration::from_millis(100), 1800));

    println!("[{}] Recording {}...", ts_now(), session_id);

    let start = Utc::now();
    let mut status_tick = interval(Duration::from_secs(2));
    status_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = status_tick.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                println!("[{}] Interrupted, ending session", ts_now());
                break;
            }
        }

        let uptime = Utc::now().signed_duration_since(start).num_seconds().max(0) as u64;
        let mut status = LiveStatus::new()
            .with_session(&controller.snapshot()?)
            .with_position(positions.last_known())
            .with_inactivity(monitor.state(), monitor.phase(), monitor.dispatched_count());
        status.uptime_seconds = uptime;
        if let Err(e) = status.save(args.output_dir.join("live_status.json")) {
            log::warn!("failed to write live status: {}", e);
        }

        if args.duration > 0 && uptime >= args.duration {
            break;
        }
        if args.duration == 0 && route_task.is_finished() {
            break;
        }
    }

    route_task.abort();
    let metrics = controller.end()?;

    if args.submit {
        match controller.save().await {
            Ok(()) => println!("[{}] Session submitted", ts_now()),
            Err(e) => println!("[{}] Submission failed: {}", ts_now(), e),
        }
    }

    if let Some(session) = controller.current_session()? {
        let path = archive::write_session(&args.output_dir, &session)?;
        println!("[{}] Archived {} to {}", ts_now(), session.id, path.display());
    }
    if controller.state()? == SessionState::Ended {
        controller.discard()?;
    }

    motion_task.abort();
    monitor.stop();

    let uptime = Utc::now().signed_duration_since(start).num_seconds().max(0) as u64;
    let mut final_status = LiveStatus::new()
        .with_session(&controller.snapshot()?)
        .with_position(positions.last_known())
        .with_inactivity(monitor.state(), monitor.phase(), monitor.dispatched_count());
    final_status.uptime_seconds = uptime;
    let _ = final_status.save(args.output_dir.join("live_status_final.json"));

    println!("\n=== Final Stats ===");
    println!("Elapsed: {} s", metrics.elapsed_seconds);
    println!("Distance: {:.1} m", metrics.total_distance_meters);
    println!("Top speed: {:.2} m/s", metrics.top_speed);
    println!("Elevation: {:.1} m", metrics.current_elevation_meters);
    println!("Position fixes: {}", metrics.sample_count);
    println!("Inactivity alerts: {}", monitor.dispatched_count());

    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fixed_location() {
        assert_eq!(parse_fixed_location("45.92, 6.87"), Ok((45.92, 6.87)));
        assert!(parse_fixed_location("45.92").is_err());
        assert!(parse_fixed_location("abc,6.87").is_err());
        assert!(parse_fixed_location("95.0,6.87").is_err());
    }

    #[test]
    fn test_demo_route_descends() {
        let route = demo_route(10);
        assert_eq!(route.len(), 10);
        assert!(route.windows(2).all(|w| w[1].altitude < w[0].altitude));
    }
}
